use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state_machine::SessionLifecycleState;

/// Broad error category used for user-facing handling and retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EngineErrorCategory {
    /// Invalid input, unsupported state, or other configuration issue.
    Config,
    /// Authentication/authorization failure.
    Auth,
    /// Transient network or transport failure.
    Network,
    /// Rate-limited by the homeserver.
    RateLimited,
    /// Storage/keyring/local persistence failure.
    Storage,
    /// Serialization/deserialization failure.
    Serialization,
    /// Internal engine bug or invariant break.
    Internal,
}

/// Stable error payload emitted across the engine boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct EngineError {
    /// High-level error category.
    pub category: EngineErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional retry hint in milliseconds.
    pub retry_after_ms: Option<u64>,
}

impl EngineError {
    /// Construct a new engine error.
    pub fn new(
        category: EngineErrorCategory,
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

    /// No usable session material was found in any storage tier.
    pub fn no_credentials_found(user_id: &str) -> Self {
        Self::new(
            EngineErrorCategory::Auth,
            "no_credentials_found",
            format!("no usable credentials found for {user_id}"),
        )
    }

    /// Refresh attempts exceeded the bounded limit within the cooldown window.
    pub fn refresh_exhausted(retry_after: Duration) -> Self {
        Self::new(
            EngineErrorCategory::RateLimited,
            "refresh_exhausted",
            "session refresh attempts exhausted; try again shortly",
        )
        .with_retry_after(retry_after)
    }

    /// The requested room is not known to the local client.
    pub fn room_not_found(room_id: &str) -> Self {
        Self::new(
            EngineErrorCategory::Config,
            "room_not_found",
            format!("room not found: {room_id}"),
        )
    }

    /// No client handle is currently available.
    pub fn client_unavailable() -> Self {
        Self::new(
            EngineErrorCategory::Config,
            "client_unavailable",
            "no protocol client is available; session not initialized",
        )
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: SessionLifecycleState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            EngineErrorCategory::Internal,
            "invalid_state_transition",
            format!("cannot run '{action}' while session is in state {current:?}"),
        )
    }

    /// Whether this error indicates an unknown/expired access token.
    ///
    /// Detection matches both the protocol error code and message substrings,
    /// since different client layers surface the same fault differently.
    pub fn is_token_invalid(&self) -> bool {
        if self.code == "M_UNKNOWN_TOKEN" || self.code == "M_MISSING_TOKEN" {
            return true;
        }
        let lowered = self.message.to_ascii_lowercase();
        lowered.contains("unknown token")
            || lowered.contains("invalid token")
            || lowered.contains("invalid access token")
            || lowered.contains("token expired")
    }
}

/// Map HTTP status codes to engine error categories.
pub fn classify_http_status(status: u16) -> EngineErrorCategory {
    match status {
        401 | 403 => EngineErrorCategory::Auth,
        408 | 429 => EngineErrorCategory::RateLimited,
        400..=499 => EngineErrorCategory::Config,
        500..=599 => EngineErrorCategory::Network,
        _ => EngineErrorCategory::Internal,
    }
}
