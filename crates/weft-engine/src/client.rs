//! Abstract protocol-client contract consumed by the engine.
//!
//! The concrete chat protocol (homeserver, bridges, wire format) stays behind
//! these traits; `weft-matrix` provides the production implementation and the
//! test suite provides scripted fakes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use weft_core::{EngineError, MemberRecord, RawEvent, SessionCredentials};

/// Coarse connection state of a client handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// State has not been observed yet.
    Unknown,
    /// Startup/sync in progress.
    Connecting,
    /// Sync loop is healthy.
    Ready,
    /// Sync loop reported a failure.
    Error,
}

/// Direction for paginated history fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationDirection {
    /// Toward older history.
    Backward,
    /// Toward newer history.
    Forward,
}

/// One page of history returned by a paginated fetch or resync.
#[derive(Debug, Clone, Default)]
pub struct HistoryChunk {
    pub chunk: Vec<RawEvent>,
    /// Cursor for the next older page; `None` when history is exhausted.
    pub next_token: Option<String>,
}

/// Out-of-band signals emitted by a client handle.
#[derive(Debug, Clone)]
pub enum ClientSignal {
    /// First successful sync pass after startup.
    SyncReady,
    ConnectionStateChanged(ConnectionState),
    /// The server invalidated this session.
    LoggedOut,
    RoomTimelineUpdated { room_id: String },
    MembershipChanged { room_id: String },
    RoomStateChanged { room_id: String },
}

/// Handle onto one room of the protocol client.
#[async_trait]
pub trait RoomHandle: Send + Sync {
    fn room_id(&self) -> &str;

    /// Events currently buffered in the live timeline, oldest first.
    fn live_events(&self) -> Vec<RawEvent>;

    /// Joined members as known to the local room model.
    async fn joined_members(&self) -> Result<Vec<MemberRecord>, EngineError>;

    async fn invited_members(&self) -> Result<Vec<MemberRecord>, EngineError>;

    /// Fetch the full member list from the server; returns the raw membership
    /// events so they can be applied into the local model.
    async fn sync_members(&self) -> Result<Vec<RawEvent>, EngineError>;

    /// Apply server membership events into the local room model. Returns
    /// `false` when the update primitive is unavailable; callers skip with a
    /// log rather than fail.
    fn apply_membership_events(&self, events: &[RawEvent]) -> bool;

    /// Timestamp of `user_id`'s latest read receipt in this room.
    async fn read_receipt_ts(&self, user_id: &str) -> Option<u64>;
}

/// Authenticated protocol client handle.
#[async_trait]
pub trait ChatClient: Send + Sync + std::fmt::Debug {
    /// User id of the authenticated session.
    fn user_id(&self) -> &str;

    fn connection_state(&self) -> ConnectionState;

    fn get_room(&self, room_id: &str) -> Option<Arc<dyn RoomHandle>>;

    /// Paginated REST-style history fetch, most recent first.
    async fn fetch_history(
        &self,
        room_id: &str,
        from_token: Option<&str>,
        limit: u16,
        direction: PaginationDirection,
    ) -> Result<HistoryChunk, EngineError>;

    /// Single-event fetch; used to resolve reaction targets and reply parents.
    async fn fetch_event(&self, room_id: &str, event_id: &str) -> Result<RawEvent, EngineError>;

    /// Full room resync; recovers from a stale local timeline.
    async fn resync_room(&self, room_id: &str, limit: u16) -> Result<HistoryChunk, EngineError>;

    /// Send a text message; returns the new event id.
    async fn send_message(&self, room_id: &str, body: &str) -> Result<String, EngineError>;

    /// Lightweight authenticated no-op probe; the token validity check.
    async fn whoami(&self) -> Result<String, EngineError>;

    /// Session material currently held by the client, when it exposes any.
    ///
    /// Used to persist rotated tokens after a fresh password login.
    fn session_credentials(&self) -> Option<SessionCredentials> {
        None
    }

    fn subscribe(&self) -> broadcast::Receiver<ClientSignal>;

    /// Stop the client and release its resources.
    async fn stop(&self);
}

/// Builds and starts client handles; owns login/restore/register mechanics.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Construct and start a client from session credentials.
    async fn build(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<Arc<dyn ChatClient>, EngineError>;

    /// Register a fresh protocol account and return its credentials.
    async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<SessionCredentials, EngineError>;
}

/// Remote identity-provider lookup; the last credential resolution tier.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn lookup(&self, user_id: &str) -> Result<Option<SessionCredentials>, EngineError>;
}
