//! Translation gateway: wire types, backend trait, and the cache-aware
//! batching client used by the orchestrator.

pub mod client;
pub mod http;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::language::LanguageCode;

pub use client::{BatchOutcome, GatewayClient};
pub use http::HttpBackend;

/// Request body sent to the translation gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    pub texts: Vec<String>,
    pub target_language: LanguageCode,
}

/// Gateway reply; `translations[i]` answers `texts[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub translations: Vec<String>,
}

/// Remote translation service (adapter for different transports).
pub trait TranslationBackend: Send + Sync {
    fn translate<'a>(
        &'a self,
        request: &'a GatewayRequest,
    ) -> BoxFuture<'a, Result<GatewayResponse, GatewayError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    Network(String),
    Status { code: u16, body: String },
    Malformed(String),
    LengthMismatch { expected: usize, got: usize },
    EmptyResult,
    Timeout,
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Network(msg) => write!(f, "gateway network error: {msg}"),
            GatewayError::Status { code, body } => {
                write!(f, "gateway returned status {code}: {body}")
            }
            GatewayError::Malformed(msg) => write!(f, "malformed gateway response: {msg}"),
            GatewayError::LengthMismatch { expected, got } => {
                write!(f, "gateway returned {got} translations for {expected} texts")
            }
            GatewayError::EmptyResult => write!(f, "gateway returned no translations"),
            GatewayError::Timeout => write!(f, "gateway request timed out"),
        }
    }
}

impl std::error::Error for GatewayError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_wire_names() {
        let request = GatewayRequest {
            texts: vec!["Breaking News".into()],
            target_language: LanguageCode::Hi,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"texts": ["Breaking News"], "targetLanguage": "hi"})
        );
    }

    #[test]
    fn response_parses_translations() {
        let parsed: GatewayResponse =
            serde_json::from_str(r#"{"translations": ["ताज़ा खबर"]}"#).unwrap();
        assert_eq!(parsed.translations, vec!["ताज़ा खबर"]);
    }
}
