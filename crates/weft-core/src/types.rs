use serde::{Deserialize, Serialize};

use crate::event::RawEvent;

/// Canonical event classification after normalization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageKind {
    /// Plain or formatted text message.
    Text,
    /// Encrypted event the engine cannot decrypt; rendered as a placeholder.
    EncryptedPlaceholder,
    /// Sticker event.
    Sticker,
    /// Annotation/reaction event.
    Reaction,
    /// Anything else.
    Unknown,
}

/// One reaction attached to a message; `(key, sender)` is unique per message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    /// Emoji/annotation key.
    pub key: String,
    /// Reacting user id.
    pub sender: String,
    /// Reaction origin timestamp in milliseconds.
    pub timestamp_ms: u64,
}

/// Annotation carried by a reaction-kind message before attachment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnnotationRef {
    /// Event id of the annotated message.
    pub event_id: String,
    /// Emoji/annotation key.
    pub key: String,
}

/// The unit of truth for one displayable event.
///
/// Created during normalization; mutated only to append reactions; the `id`
/// is stable across normalization passes and is the merge identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalMessage {
    /// Globally unique id within the room.
    pub id: String,
    pub room_id: String,
    pub kind: MessageKind,
    /// Protocol-level sender identifier.
    pub sender: String,
    /// Resolved or synthesized display name for the sender.
    pub sender_display_name: String,
    /// Display body; always non-empty after normalization.
    pub body: String,
    /// Origin timestamp in milliseconds; primary sort key.
    pub timestamp_ms: u64,
    pub is_from_current_user: bool,
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
    /// Set on reaction-kind messages only; consumed during attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotates: Option<AnnotationRef>,
}

impl CanonicalMessage {
    /// Append a reaction, keeping `(key, sender)` unique.
    pub fn push_reaction(&mut self, reaction: Reaction) {
        let duplicate = self
            .reactions
            .iter()
            .any(|existing| existing.key == reaction.key && existing.sender == reaction.sender);
        if !duplicate {
            self.reactions.push(reaction);
        }
    }
}

/// Membership state relevant for presentation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MembershipState {
    Joined,
    Invited,
}

/// Directory record for one room member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberRecord {
    pub user_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    #[serde(default)]
    pub power_level: i64,
    pub membership: MembershipState,
}

/// Sort members for presentation: power descending, then name ascending.
pub fn sort_members_for_display(members: &mut [MemberRecord]) {
    members.sort_by(|a, b| {
        b.power_level
            .cmp(&a.power_level)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
}

/// Session material for one protocol account.
///
/// Usable only when `access_token` is non-empty and has been validated with a
/// `whoami`-style probe. Superseded whole on refresh, never partially updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionCredentials {
    pub user_id: String,
    pub access_token: String,
    pub device_id: String,
    pub homeserver_url: String,
    /// Retained to allow silent re-login when the token dies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl SessionCredentials {
    /// Whether this record is a usable resolution candidate.
    pub fn is_candidate(&self) -> bool {
        !self.user_id.is_empty() && !self.access_token.is_empty()
    }
}

/// Per-room raw-event cache kept warm between reconciliation passes.
///
/// Fully replaced (not merged) on each successful pass; `events` holds no
/// duplicate identity keys and is sorted ascending by timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomTimelineCacheEntry {
    pub events: Vec<RawEvent>,
    /// Whether older history may still exist upstream.
    pub has_more: bool,
    pub last_updated_ms: u64,
}
