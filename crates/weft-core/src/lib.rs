//! Core contract shared by the Weftchat engine and its protocol adapters.
//!
//! This crate defines the canonical message model, the tagged raw-event
//! union, event normalization, timeline merge helpers, the session lifecycle
//! state machine, and common retry/error primitives. It performs no I/O.

/// Stable engine error types and HTTP classification helpers.
pub mod error;
/// Tagged raw-event union; the single ingestion boundary for event shapes.
pub mod event;
/// Raw-event-to-canonical-message normalization.
pub mod normalize;
/// Backoff policy and refresh throttling primitives.
pub mod retry;
/// Session validate/refresh lifecycle state machine.
pub mod state_machine;
/// Timeline merge buffer and finalization helpers.
pub mod timeline;
/// Canonical message, member and credential types.
pub mod types;

pub use error::{EngineError, EngineErrorCategory, classify_http_status};
pub use event::{EventEnvelope, EventStub, RawEvent};
pub use normalize::{RoomContext, normalize};
pub use retry::{RefreshThrottle, RetryPolicy, ThrottleDecision};
pub use state_machine::{SessionLifecycleState, SessionStateMachine};
pub use timeline::{MergeBuffer, attach_reactions, sort_by_timestamp};
pub use types::{
    AnnotationRef, CanonicalMessage, MemberRecord, MembershipState, MessageKind, Reaction,
    RoomTimelineCacheEntry, SessionCredentials, sort_members_for_display,
};
