//! page-translate: incremental translation of a live document tree.
//! Library root: module wiring, tracing setup, and the context object that
//! owns one pipeline instance.

pub mod config;
pub mod dom;
pub mod guard;
pub mod html;
pub mod language;
pub mod notify;
pub mod orchestrator;
pub mod preferences;
pub mod scanner;
pub mod state_machine;
pub mod stats;
pub mod storage;
pub mod translate;
pub mod watcher;

use std::sync::Arc;

use crossbeam_channel::Receiver;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::TranslatorConfig;
use dom::{NodeId, SharedDocument};
use notify::{Notice, Notifier};
use orchestrator::Orchestrator;
use preferences::LanguageStore;
use stats::PipelineStats;
use storage::{Persister, Storage};
use translate::{GatewayClient, GatewayError, HttpBackend, TranslationBackend};
use watcher::MutationWatcher;

pub use language::LanguageCode;
pub use orchestrator::{PassOutcome, PassReport, Trigger};

const DEFAULT_FILTER: &str = "page_translate=info";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
/// Calling it more than once is harmless.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Everything one pipeline instance needs, passed around explicitly instead
/// of living in globals.
pub struct TranslationContext {
    pub config: TranslatorConfig,
    pub store: Arc<LanguageStore>,
    pub stats: Arc<PipelineStats>,
    pub orchestrator: Arc<Orchestrator>,
    notices: Receiver<Notice>,
}

impl TranslationContext {
    /// Wire a pipeline over `root` in `document`. With deferred persistence
    /// this must be called inside a tokio runtime.
    pub fn new(
        config: TranslatorConfig,
        document: SharedDocument,
        root: NodeId,
        storage: Arc<dyn Storage>,
        backend: Arc<dyn TranslationBackend>,
    ) -> Self {
        let persister = Persister::new(storage, config.persist_mode);
        let store = Arc::new(LanguageStore::load_with(
            persister,
            &config.language_key,
            &config.cache_key,
            config.cache_capacity,
        ));
        let stats = Arc::new(PipelineStats::new());
        let gateway = GatewayClient::new(
            backend,
            Arc::clone(&store),
            Arc::clone(&stats),
            config.request_timeout,
        );
        let (notifier, notices) = Notifier::channel();
        let orchestrator = Arc::new(Orchestrator::new(
            document,
            root,
            Arc::clone(&store),
            gateway,
            config.scanner(),
            notifier,
            Arc::clone(&stats),
            config.discard_stale_passes,
        ));

        info!(
            gateway = %config.gateway_url,
            language = %store.current_language(),
            discard_stale = config.discard_stale_passes,
            "translation context ready"
        );

        Self {
            config,
            store,
            stats,
            orchestrator,
            notices,
        }
    }

    /// Same as `new`, talking to `config.gateway_url` over HTTP.
    pub fn with_http_backend(
        config: TranslatorConfig,
        document: SharedDocument,
        root: NodeId,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, GatewayError> {
        let backend = HttpBackend::new(
            config.gateway_url.clone(),
            config.api_key.clone(),
            config.request_timeout,
        )?;
        Ok(Self::new(config, document, root, storage, Arc::new(backend)))
    }

    /// Start watching the root with the configured debounce windows.
    pub fn watch(&self) -> MutationWatcher {
        self.orchestrator.attach_watcher(self.config.debounce_windows())
    }

    /// User-facing notices; drain at leisure.
    pub fn notices(&self) -> &Receiver<Notice> {
        &self.notices
    }
}
