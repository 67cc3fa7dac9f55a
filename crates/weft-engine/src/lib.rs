//! Session lifecycle and timeline reconciliation engine.
//!
//! Orchestrates credential discovery, session validation/refresh, and
//! multi-source message reconciliation over an abstract protocol client.

use std::time::{SystemTime, UNIX_EPOCH};

/// Reconciled-message cache collaborator.
pub mod cache;
/// Abstract protocol-client traits.
pub mod client;
/// Tiered credential discovery.
pub mod credentials;
/// Short-TTL room member cache.
pub mod members;
/// Session notice channel payloads.
pub mod notice;
/// Multi-source timeline reconciliation.
pub mod reconcile;
/// Session validation and throttled refresh.
pub mod refresh;
/// Long-lived session context.
pub mod session;

pub use cache::{InMemoryMessageCache, MessageCache};
pub use client::{
    ChatClient, ClientFactory, ClientSignal, ConnectionState, HistoryChunk, IdentityProvider,
    PaginationDirection, RoomHandle,
};
pub use credentials::CredentialResolver;
pub use members::{MemberCache, RoomMembers};
pub use notice::EngineNotice;
pub use reconcile::{LoadOptions, MessageEngine};
pub use refresh::{SessionRefresher, derived_registration};
pub use session::{SessionConfig, SessionContext};

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
