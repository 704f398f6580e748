//! Pipeline configuration: defaults plus environment overrides.
//! Bad values are logged and ignored; configuration never fails start-up.

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::preferences::{DEFAULT_CACHE_KEY, DEFAULT_LANGUAGE_KEY};
use crate::scanner::TextScanner;
use crate::storage::PersistMode;
use crate::watcher::DebounceWindows;

pub const ENV_GATEWAY_URL: &str = "PAGE_TRANSLATE_GATEWAY_URL";
pub const ENV_API_KEY: &str = "PAGE_TRANSLATE_API_KEY";
pub const ENV_TIMEOUT_MS: &str = "PAGE_TRANSLATE_TIMEOUT_MS";
pub const ENV_MIN_CHARS: &str = "PAGE_TRANSLATE_MIN_CHARS";
pub const ENV_NON_VERBAL: &str = "PAGE_TRANSLATE_NON_VERBAL";
pub const ENV_STRUCTURAL_DEBOUNCE_MS: &str = "PAGE_TRANSLATE_STRUCTURAL_DEBOUNCE_MS";
pub const ENV_PLAIN_DEBOUNCE_MS: &str = "PAGE_TRANSLATE_PLAIN_DEBOUNCE_MS";
pub const ENV_CACHE_CAPACITY: &str = "PAGE_TRANSLATE_CACHE_CAPACITY";
pub const ENV_DISCARD_STALE: &str = "PAGE_TRANSLATE_DISCARD_STALE";
pub const ENV_PERSIST: &str = "PAGE_TRANSLATE_PERSIST";

#[derive(Debug, Clone, Serialize)]
pub struct TranslatorConfig {
    pub gateway_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    /// Trimmed text shorter than this is never sent to the gateway.
    pub min_text_chars: usize,
    /// Also send digit, punctuation and symbol-only text (scores, prices).
    pub translate_non_verbal: bool,
    pub structural_debounce: Duration,
    pub plain_debounce: Duration,
    /// `None` keeps every cached translation forever.
    pub cache_capacity: Option<usize>,
    /// Drop results of a pass whose language was changed mid-flight.
    pub discard_stale_passes: bool,
    #[serde(skip_serializing)]
    pub persist_mode: PersistMode,
    pub language_key: String,
    pub cache_key: String,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:54321/functions/v1/translate".into(),
            api_key: None,
            request_timeout: Duration::from_secs(15),
            min_text_chars: 2,
            translate_non_verbal: false,
            structural_debounce: Duration::from_millis(150),
            plain_debounce: Duration::from_millis(600),
            cache_capacity: None,
            discard_stale_passes: false,
            persist_mode: PersistMode::Immediate,
            language_key: DEFAULT_LANGUAGE_KEY.into(),
            cache_key: DEFAULT_CACHE_KEY.into(),
        }
    }
}

impl TranslatorConfig {
    /// Defaults overlaid with `PAGE_TRANSLATE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(url) = lookup(ENV_GATEWAY_URL).filter(|v| !v.trim().is_empty()) {
            cfg.gateway_url = url.trim().to_string();
        }
        cfg.api_key = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty());
        if let Some(ms) = parsed::<u64>(&lookup, ENV_TIMEOUT_MS) {
            cfg.request_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parsed::<usize>(&lookup, ENV_MIN_CHARS) {
            cfg.min_text_chars = n;
        }
        if let Some(flag) = parsed::<bool>(&lookup, ENV_NON_VERBAL) {
            cfg.translate_non_verbal = flag;
        }
        if let Some(ms) = parsed::<u64>(&lookup, ENV_STRUCTURAL_DEBOUNCE_MS) {
            cfg.structural_debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed::<u64>(&lookup, ENV_PLAIN_DEBOUNCE_MS) {
            cfg.plain_debounce = Duration::from_millis(ms);
        }
        if let Some(n) = parsed::<usize>(&lookup, ENV_CACHE_CAPACITY) {
            cfg.cache_capacity = (n > 0).then_some(n);
        }
        if let Some(flag) = parsed::<bool>(&lookup, ENV_DISCARD_STALE) {
            cfg.discard_stale_passes = flag;
        }
        if let Some(mode) = lookup(ENV_PERSIST) {
            match mode.trim().to_ascii_lowercase().as_str() {
                "immediate" => cfg.persist_mode = PersistMode::Immediate,
                "deferred" => cfg.persist_mode = PersistMode::Deferred,
                other => warn!(key = ENV_PERSIST, value = other, "unknown persist mode, using default"),
            }
        }

        cfg
    }

    pub fn scanner(&self) -> TextScanner {
        let scanner = TextScanner::new(self.min_text_chars);
        if self.translate_non_verbal {
            scanner.including_non_verbal()
        } else {
            scanner
        }
    }

    pub fn debounce_windows(&self) -> DebounceWindows {
        DebounceWindows {
            structural: self.structural_debounce,
            plain: self.plain_debounce,
        }
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "invalid config value, using default");
            None
        }
    }
}
