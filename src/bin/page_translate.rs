//! page-translate: run the pipeline over an HTML file and print the result.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::info;

use page_translate::config::TranslatorConfig;
use page_translate::html::{parse_html_file, to_html};
use page_translate::storage::{MemoryStorage, SqliteStorage, Storage};
use page_translate::translate::{GatewayError, GatewayRequest, GatewayResponse, TranslationBackend};
use page_translate::{init_tracing, LanguageCode, TranslationContext};

#[derive(Parser, Debug)]
#[command(name = "page-translate", version, about = "Translate the text of an HTML page in place")]
struct Cli {
    /// HTML file to translate.
    input: PathBuf,

    /// Target language code (en, hi, bn, ta, te, mr, gu, kn, ml, pa, ur).
    #[arg(long, short)]
    lang: LanguageCode,

    /// Translate only inside the element with this id (default: <body>).
    #[arg(long)]
    root: Option<String>,

    /// SQLite file for the durable language preference and cache.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Tag text instead of calling the gateway.
    #[arg(long)]
    dry_run: bool,

    /// Switch back to the source language and print the restored page too.
    #[arg(long)]
    restore: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

/// Offline stand-in for the gateway: prefixes each text with the language code.
struct EchoBackend;

impl TranslationBackend for EchoBackend {
    fn translate<'a>(
        &'a self,
        request: &'a GatewayRequest,
    ) -> BoxFuture<'a, Result<GatewayResponse, GatewayError>> {
        let translations = request
            .texts
            .iter()
            .map(|text| format!("[{}] {}", request.target_language, text))
            .collect();
        async move { Ok(GatewayResponse { translations }) }.boxed()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = TranslatorConfig::from_env();
    let doc = parse_html_file(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;

    let root = match &cli.root {
        Some(id) => doc
            .find_by_id(id)
            .with_context(|| format!("no element with id {id:?}"))?,
        None => doc.first_element_by_tag("body").unwrap_or_else(|| doc.root()),
    };
    let document = doc.into_shared();

    let storage: Arc<dyn Storage> = match &cli.db {
        Some(path) => Arc::new(
            SqliteStorage::open(path).with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Arc::new(MemoryStorage::new()),
    };

    let ctx = if cli.dry_run {
        TranslationContext::new(config, Arc::clone(&document), root, storage, Arc::new(EchoBackend))
    } else {
        TranslationContext::with_http_backend(config, Arc::clone(&document), root, storage)
            .context("building gateway client")?
    };

    let mut report = ctx.orchestrator.mount().await;
    if let Some(changed) = ctx.orchestrator.set_language(cli.lang).await {
        report = changed;
    }
    info!(
        language = %cli.lang,
        name = cli.lang.native_name(),
        outcome = ?report.outcome,
        writes = report.writes,
        "page translated"
    );

    for notice in ctx.notices().try_iter() {
        eprintln!("{:?}: {}", notice.level, notice.message);
    }
    {
        let doc = document.lock();
        println!("{}", to_html(&doc, doc.root()));
    }

    if cli.restore {
        ctx.orchestrator.set_language(LanguageCode::SOURCE).await;
        let doc = document.lock();
        println!("{}", to_html(&doc, doc.root()));
    }

    let stats = serde_json::to_string(&ctx.stats.snapshot()).context("encoding stats")?;
    info!(stats = %stats, "done");
    Ok(())
}
