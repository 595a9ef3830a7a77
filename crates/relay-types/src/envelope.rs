use serde::{Deserialize, Serialize};

/// Body of every failed call. Delivered with HTTP 200, so clients must
/// inspect the body rather than the status code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
