use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::AuthError;

/// Broad error category used for logging and retry decisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BridgeErrorCategory {
    /// Invalid input or configuration.
    Config,
    /// Authentication/authorization failure, including a dismissed popup.
    Auth,
    /// Transient network or transport failure.
    Network,
    /// Rate-limited or quota exhausted by the backend.
    RateLimited,
    /// Session persistence failure.
    Storage,
    /// Serialization/deserialization failure.
    Serialization,
    /// Internal bug or unexpected backend response.
    Internal,
}

/// Stable error type shared by backend implementations and the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct BridgeError {
    /// High-level error category.
    pub category: BridgeErrorCategory,
    /// Backend error code (`auth/...` or Firestore status code).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional retry hint in milliseconds.
    pub retry_after_ms: Option<u64>,
}

impl BridgeError {
    /// Construct a new bridge error.
    pub fn new(
        category: BridgeErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Attach a retry hint to the error.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after_ms = Some(retry_after.as_millis() as u64);
        self
    }

    /// Whether a background loop may try the same call again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.category,
            BridgeErrorCategory::Network | BridgeErrorCategory::RateLimited
        )
    }
}

impl From<BridgeError> for AuthError {
    fn from(err: BridgeError) -> Self {
        Self {
            code: err.code,
            message: err.message,
        }
    }
}

/// Map HTTP status codes to bridge error categories.
pub fn classify_http_status(status: u16) -> BridgeErrorCategory {
    match status {
        401 | 403 => BridgeErrorCategory::Auth,
        408 | 429 => BridgeErrorCategory::RateLimited,
        400..=499 => BridgeErrorCategory::Config,
        500..=599 => BridgeErrorCategory::Network,
        _ => BridgeErrorCategory::Internal,
    }
}
