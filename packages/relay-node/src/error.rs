//! Error types for the relay node.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_types::ErrorEnvelope;

/// Relay node error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unusable local configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Chain RPC communication error.
    #[error("rpc error: {0}")]
    Rpc(String),
    /// Signing key could not be loaded or persisted.
    #[error("key store error: {0}")]
    KeyStore(String),
    /// Admission control refused the request.
    #[error("{0}")]
    NotReady(String),
    /// Client input failed to decode.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The engine refused to relay the request.
    #[error("relay rejected: {0}")]
    Rejected(String),
    /// Transaction construction or signing failed.
    #[error("signing error: {0}")]
    Signing(String),
    /// An audited transaction revealed a violation or could not be checked.
    #[error("audit: {0}")]
    Audit(String),
}

impl IntoResponse for Error {
    /// Every failure is HTTP 200 with an `{"error": ...}` body; clients
    /// detect failure from the body.
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(ErrorEnvelope::new(self.to_string()))).into_response()
    }
}
