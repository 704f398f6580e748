//! Cache-aware batching client.
//! Cached strings resolve locally; every miss in a batch goes out in one
//! gateway call. Failures fail open: the caller gets its input back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{GatewayError, GatewayRequest, TranslationBackend};
use crate::language::LanguageCode;
use crate::preferences::LanguageStore;
use crate::stats::{metric_names, Counter, PipelineStats};

/// Result of resolving one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Same length and order as the input. On failure, the input unchanged.
    pub translations: Vec<String>,
    /// Distinct strings sent to the gateway.
    pub fetched: usize,
    pub error: Option<GatewayError>,
}

impl BatchOutcome {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

pub struct GatewayClient {
    backend: Arc<dyn TranslationBackend>,
    store: Arc<LanguageStore>,
    stats: Arc<PipelineStats>,
    timeout: Duration,
}

impl GatewayClient {
    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        store: Arc<LanguageStore>,
        stats: Arc<PipelineStats>,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            store,
            stats,
            timeout,
        }
    }

    /// Resolve `texts` into `target`, preserving input order.
    pub async fn translate_batch(&self, texts: &[String], target: LanguageCode) -> BatchOutcome {
        if texts.is_empty() || target.is_source() {
            return BatchOutcome {
                translations: texts.to_vec(),
                fetched: 0,
                error: None,
            };
        }

        let mut resolved: Vec<Option<String>> = Vec::with_capacity(texts.len());
        let mut to_fetch: Vec<String> = Vec::new();
        let mut fetch_slot: HashMap<&str, usize> = HashMap::new();

        for text in texts {
            match self.store.get_cached(text, target) {
                Some(hit) => {
                    self.stats.incr(Counter::CacheHits);
                    resolved.push(Some(hit));
                }
                None => {
                    if !fetch_slot.contains_key(text.as_str()) {
                        fetch_slot.insert(text.as_str(), to_fetch.len());
                        to_fetch.push(text.clone());
                    }
                    resolved.push(None);
                }
            }
        }

        if to_fetch.is_empty() {
            debug!(texts = texts.len(), "batch fully served from cache");
            return BatchOutcome {
                translations: resolved.into_iter().flatten().collect(),
                fetched: 0,
                error: None,
            };
        }

        let fetched = to_fetch.len();
        let fresh = match self.fetch(to_fetch.clone(), target).await {
            Ok(fresh) => fresh,
            Err(e) => {
                self.stats.incr(Counter::GatewayFailures);
                warn!(error = %e, target = %target, texts = fetched, "gateway failed, keeping originals");
                return BatchOutcome {
                    translations: texts.to_vec(),
                    fetched,
                    error: Some(e),
                };
            }
        };

        for (source, translation) in to_fetch.iter().zip(&fresh) {
            self.store.put_cached(source, target, translation);
        }
        self.stats.add(Counter::FetchedTexts, fetched as u64);

        let translations = texts
            .iter()
            .zip(resolved)
            .map(|(text, hit)| hit.unwrap_or_else(|| fresh[fetch_slot[text.as_str()]].clone()))
            .collect();

        BatchOutcome {
            translations,
            fetched,
            error: None,
        }
    }

    async fn fetch(
        &self,
        texts: Vec<String>,
        target: LanguageCode,
    ) -> Result<Vec<String>, GatewayError> {
        let expected = texts.len();
        let request = GatewayRequest {
            texts,
            target_language: target,
        };

        self.stats.incr(Counter::GatewayCalls);
        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.backend.translate(&request)).await;
        self.stats.record(
            metric_names::GATEWAY_CALL,
            start.elapsed().as_micros() as f64,
        );

        let response = result.map_err(|_| GatewayError::Timeout)??;
        match response.translations.len() {
            0 => Err(GatewayError::EmptyResult),
            got if got != expected => Err(GatewayError::LengthMismatch { expected, got }),
            _ => Ok(response.translations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, Persister};
    use crate::translate::GatewayResponse;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use parking_lot::Mutex;

    /// Upper-cases every text and records what it was asked.
    #[derive(Default)]
    struct Shouting {
        calls: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    impl TranslationBackend for Shouting {
        fn translate<'a>(
            &'a self,
            request: &'a GatewayRequest,
        ) -> BoxFuture<'a, Result<GatewayResponse, GatewayError>> {
            self.calls.lock().push(request.texts.clone());
            let result = if self.fail {
                Err(GatewayError::Network("connection refused".into()))
            } else {
                Ok(GatewayResponse {
                    translations: request.texts.iter().map(|t| t.to_uppercase()).collect(),
                })
            };
            async move { result }.boxed()
        }
    }

    fn client(backend: Arc<Shouting>) -> (GatewayClient, Arc<LanguageStore>) {
        let store = Arc::new(LanguageStore::load(Persister::immediate(Arc::new(
            MemoryStorage::new(),
        ))));
        let client = GatewayClient::new(
            backend,
            Arc::clone(&store),
            Arc::new(PipelineStats::new()),
            Duration::from_secs(5),
        );
        (client, store)
    }

    /// Misbehaving gateways.
    enum Faulty {
        Short,
        Empty,
        Garbled,
        Hangs,
    }

    impl TranslationBackend for Faulty {
        fn translate<'a>(
            &'a self,
            request: &'a GatewayRequest,
        ) -> BoxFuture<'a, Result<GatewayResponse, GatewayError>> {
            let result = match self {
                Faulty::Short => Ok(GatewayResponse {
                    translations: request.texts[1..].to_vec(),
                }),
                Faulty::Empty => Ok(GatewayResponse {
                    translations: Vec::new(),
                }),
                Faulty::Garbled => Err(GatewayError::Malformed("expected value at line 1".into())),
                Faulty::Hangs => return futures_util::future::pending().boxed(),
            };
            async move { result }.boxed()
        }
    }

    async fn fails_open(backend: Faulty) -> (BatchOutcome, Arc<LanguageStore>) {
        let store = Arc::new(LanguageStore::load(Persister::immediate(Arc::new(
            MemoryStorage::new(),
        ))));
        let stats = Arc::new(PipelineStats::new());
        let client = GatewayClient::new(
            Arc::new(backend),
            Arc::clone(&store),
            Arc::clone(&stats),
            Duration::from_millis(50),
        );
        let input = strings(&["Breaking News", "Sports"]);
        let outcome = client.translate_batch(&input, LanguageCode::Hi).await;

        assert_eq!(outcome.translations, input);
        assert!(outcome.is_failure());
        assert_eq!(store.cache_len(), 0);
        assert_eq!(stats.get(Counter::GatewayFailures), 1);
        (outcome, store)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_input_makes_no_call() {
        let backend = Arc::new(Shouting::default());
        let (client, _) = client(Arc::clone(&backend));
        let outcome = client.translate_batch(&[], LanguageCode::Hi).await;
        assert!(outcome.translations.is_empty());
        assert!(backend.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn duplicates_and_cache_hits_are_not_refetched() {
        let backend = Arc::new(Shouting::default());
        let (client, store) = client(Arc::clone(&backend));
        store.put_cached("world", LanguageCode::Hi, "दुनिया");

        let input = strings(&["hello", "world", "hello", "news"]);
        let outcome = client.translate_batch(&input, LanguageCode::Hi).await;

        assert_eq!(outcome.translations, strings(&["HELLO", "दुनिया", "HELLO", "NEWS"]));
        assert_eq!(outcome.fetched, 2);
        assert_eq!(*backend.calls.lock(), vec![strings(&["hello", "news"])]);
        assert_eq!(store.get_cached("news", LanguageCode::Hi).as_deref(), Some("NEWS"));
    }

    #[tokio::test]
    async fn failure_returns_input_unchanged() {
        let backend = Arc::new(Shouting {
            fail: true,
            ..Default::default()
        });
        let (client, store) = client(backend);
        let input = strings(&["hello", "world"]);
        let outcome = client.translate_batch(&input, LanguageCode::Ta).await;

        assert_eq!(outcome.translations, input);
        assert!(matches!(outcome.error, Some(GatewayError::Network(_))));
        assert_eq!(store.cache_len(), 0);
    }

    #[tokio::test]
    async fn short_response_fails_open() {
        let (outcome, _) = fails_open(Faulty::Short).await;
        assert_eq!(
            outcome.error,
            Some(GatewayError::LengthMismatch { expected: 2, got: 1 })
        );
    }

    #[tokio::test]
    async fn empty_response_fails_open() {
        let (outcome, _) = fails_open(Faulty::Empty).await;
        assert_eq!(outcome.error, Some(GatewayError::EmptyResult));
    }

    #[tokio::test]
    async fn malformed_response_fails_open() {
        let (outcome, _) = fails_open(Faulty::Garbled).await;
        assert!(matches!(outcome.error, Some(GatewayError::Malformed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_gateway_times_out_and_fails_open() {
        let (outcome, store) = fails_open(Faulty::Hangs).await;
        assert_eq!(outcome.error, Some(GatewayError::Timeout));
        assert_eq!(outcome.fetched, 2);
        assert!(store.get_cached("Sports", LanguageCode::Hi).is_none());
    }
}
