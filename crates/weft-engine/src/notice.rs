//! User-visible notices published by the session layer.
//!
//! The UI subscribes to this channel instead of any layer intercepting
//! ambient alert APIs.

/// Notices emitted on the session notice channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineNotice {
    /// Refresh attempts are exhausted; retry after the given delay.
    RefreshCooldown { retry_after_ms: u64 },
    /// The client handle was rebuilt; subscribers should re-attach.
    SessionReplaced { user_id: String },
}
