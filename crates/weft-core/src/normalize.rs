use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::{
    event::RawEvent,
    types::{AnnotationRef, CanonicalMessage, MessageKind},
};

const EVENT_TYPE_MESSAGE: &str = "m.room.message";
const EVENT_TYPE_ENCRYPTED: &str = "m.room.encrypted";
const EVENT_TYPE_STICKER: &str = "m.sticker";
const EVENT_TYPE_REACTION: &str = "m.reaction";

/// Per-room inputs required to normalize a raw event.
#[derive(Debug, Clone)]
pub struct RoomContext<'a> {
    pub room_id: &'a str,
    /// Authenticated session user id; drives `is_from_current_user`.
    pub own_user_id: &'a str,
    /// Wall-clock time used for synthetic ids on id-less events.
    pub now_ms: u64,
    /// Timestamp of the session user's latest read receipt, when known.
    pub read_receipt_ts: Option<u64>,
    /// Room directory: sender id -> display name.
    pub directory: &'a HashMap<String, String>,
}

/// Convert one raw event into a canonical message.
///
/// Never fails: a raw event carrying no usable identity at all yields a
/// minimal fallback message so one malformed event cannot abort a batch.
pub fn normalize(event: &RawEvent, ctx: &RoomContext<'_>) -> CanonicalMessage {
    normalize_inner(event, ctx).unwrap_or_else(|| fallback_message(ctx))
}

fn normalize_inner(event: &RawEvent, ctx: &RoomContext<'_>) -> Option<CanonicalMessage> {
    if event.event_id().is_none() && event.sender().is_none() {
        return None;
    }

    let id = event
        .event_id()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| synthetic_id(ctx.now_ms));
    let sender = event.sender().unwrap_or_default().to_owned();
    let timestamp_ms = event.timestamp_ms().unwrap_or(ctx.now_ms);
    let kind = classify(event);

    let is_from_current_user = !sender.is_empty() && sender == ctx.own_user_id;
    let is_read = is_from_current_user
        || ctx
            .read_receipt_ts
            .is_some_and(|receipt_ts| timestamp_ms <= receipt_ts);

    let annotates = event
        .annotation_target()
        .map(|(target, key)| AnnotationRef {
            event_id: target.to_owned(),
            key: key.to_owned(),
        });

    Some(CanonicalMessage {
        id,
        room_id: ctx.room_id.to_owned(),
        kind,
        sender_display_name: derive_display_name(event, &sender, ctx),
        sender,
        body: derive_body(event, kind),
        timestamp_ms,
        is_from_current_user,
        is_read,
        reply_to_event_id: event.reply_target().map(ToOwned::to_owned),
        reactions: Vec::new(),
        annotates,
    })
}

fn classify(event: &RawEvent) -> MessageKind {
    match event.event_type() {
        Some(EVENT_TYPE_MESSAGE) => MessageKind::Text,
        Some(EVENT_TYPE_ENCRYPTED) => MessageKind::EncryptedPlaceholder,
        Some(EVENT_TYPE_STICKER) => MessageKind::Sticker,
        Some(EVENT_TYPE_REACTION) => MessageKind::Reaction,
        _ => MessageKind::Unknown,
    }
}

/// Body resolution order: direct body, markup-stripped formatted body, media
/// subtype label, kind-specific placeholder, generic placeholder.
fn derive_body(event: &RawEvent, kind: MessageKind) -> String {
    let content = event.content();

    if let Some(body) = content
        .and_then(|c| c.get("body"))
        .and_then(Value::as_str)
        .filter(|body| !body.is_empty())
    {
        return body.to_owned();
    }

    if let Some(formatted) = content
        .and_then(|c| c.get("formatted_body"))
        .and_then(Value::as_str)
    {
        let stripped = strip_markup(formatted);
        if !stripped.is_empty() {
            return stripped;
        }
    }

    if let Some(label) = content
        .and_then(|c| c.get("msgtype"))
        .and_then(Value::as_str)
        .and_then(media_label)
    {
        return label.to_owned();
    }

    match kind {
        MessageKind::EncryptedPlaceholder => "Encrypted message".to_owned(),
        MessageKind::Sticker => "Sticker".to_owned(),
        _ => "Message".to_owned(),
    }
}

fn media_label(msgtype: &str) -> Option<&'static str> {
    match msgtype {
        "m.image" => Some("Image"),
        "m.file" => Some("File"),
        "m.audio" => Some("Audio"),
        "m.video" => Some("Video"),
        _ => None,
    }
}

fn strip_markup(formatted: &str) -> String {
    let mut out = String::with_capacity(formatted.len());
    let mut in_tag = false;
    for ch in formatted.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_owned()
}

/// Display-name resolution: carried name, directory lookup, bridged-id
/// synthesis, bare localpart.
///
/// Bridged senders frequently lack a directory entry until the bridge
/// backfills it, so the synthesis rule is load-bearing, not cosmetic.
fn derive_display_name(event: &RawEvent, sender: &str, ctx: &RoomContext<'_>) -> String {
    if let Some(carried) = carried_display_name(event)
        && carried != sender
        && !carried.is_empty()
    {
        return carried.to_owned();
    }

    if let Some(known) = ctx.directory.get(sender) {
        return known.clone();
    }

    if let Some(synthesized) = synthesize_bridge_name(sender) {
        return synthesized;
    }

    localpart(sender).to_owned()
}

fn carried_display_name(event: &RawEvent) -> Option<&str> {
    match event {
        RawEvent::Envelope(envelope) => envelope
            .unsigned
            .as_ref()
            .and_then(|unsigned| unsigned.get("displayname"))
            .and_then(Value::as_str),
        RawEvent::Json(value) => value
            .get("sender_display_name")
            .and_then(Value::as_str)
            .or_else(|| {
                value
                    .get("unsigned")
                    .and_then(|unsigned| unsigned.get("displayname"))
                    .and_then(Value::as_str)
            }),
        RawEvent::Stub(_) => None,
    }
}

/// Match bridged identifiers like `@telegram_123456:bridge.example.org` and
/// synthesize "<Network> User <id>".
fn synthesize_bridge_name(sender: &str) -> Option<String> {
    let local = localpart(sender);
    let (prefix, id) = local.split_once('_')?;
    if id.is_empty() || !id.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }

    let network = match prefix {
        "telegram" => "Telegram".to_owned(),
        "whatsapp" => "WhatsApp".to_owned(),
        "signal" => "Signal".to_owned(),
        other if !other.is_empty() => {
            let mut chars = other.chars();
            let first = chars.next()?;
            first.to_uppercase().collect::<String>() + chars.as_str()
        }
        _ => return None,
    };

    Some(format!("{network} User {id}"))
}

fn localpart(sender: &str) -> &str {
    let trimmed = sender.strip_prefix('@').unwrap_or(sender);
    trimmed.split(':').next().unwrap_or(trimmed)
}

fn synthetic_id(now_ms: u64) -> String {
    format!("local-{now_ms}-{}", Uuid::new_v4().simple())
}

fn fallback_message(ctx: &RoomContext<'_>) -> CanonicalMessage {
    CanonicalMessage {
        id: synthetic_id(ctx.now_ms),
        room_id: ctx.room_id.to_owned(),
        kind: MessageKind::Unknown,
        sender: String::new(),
        sender_display_name: String::new(),
        body: "Error processing message".to_owned(),
        timestamp_ms: ctx.now_ms,
        is_from_current_user: false,
        is_read: false,
        reply_to_event_id: None,
        reactions: Vec::new(),
        annotates: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventEnvelope, EventStub};
    use serde_json::json;

    fn ctx<'a>(directory: &'a HashMap<String, String>) -> RoomContext<'a> {
        RoomContext {
            room_id: "!r1:example.org",
            own_user_id: "@me:example.org",
            now_ms: 1_700_000_100_000,
            read_receipt_ts: Some(1_700_000_050_000),
            directory,
        }
    }

    fn text_event(event_id: &str, sender: &str, ts: u64, body: &str) -> RawEvent {
        RawEvent::Json(json!({
            "event_id": event_id,
            "sender": sender,
            "type": "m.room.message",
            "origin_server_ts": ts,
            "content": {"msgtype": "m.text", "body": body}
        }))
    }

    #[test]
    fn normalization_is_idempotent_for_id_and_body() {
        let directory = HashMap::new();
        let ctx = ctx(&directory);
        let event = text_event("$e1", "@alice:example.org", 10, "hello");

        let first = normalize(&event, &ctx);
        let second = normalize(&event, &ctx);
        assert_eq!(first.id, second.id);
        assert_eq!(first.body, second.body);
        assert_eq!(first.id, "$e1");
    }

    #[test]
    fn video_without_body_falls_back_to_label() {
        let directory = HashMap::new();
        let event = RawEvent::Json(json!({
            "event_id": "$v1",
            "sender": "@alice:example.org",
            "type": "m.room.message",
            "origin_server_ts": 10,
            "content": {"msgtype": "m.video"}
        }));
        let message = normalize(&event, &ctx(&directory));
        assert_eq!(message.body, "Video");
    }

    #[test]
    fn encrypted_event_gets_placeholder_body() {
        let directory = HashMap::new();
        let event = RawEvent::Json(json!({
            "event_id": "$enc",
            "sender": "@alice:example.org",
            "type": "m.room.encrypted",
            "origin_server_ts": 10,
            "content": {"algorithm": "m.megolm.v1.aes-sha2"}
        }));
        let message = normalize(&event, &ctx(&directory));
        assert_eq!(message.kind, MessageKind::EncryptedPlaceholder);
        assert_eq!(message.body, "Encrypted message");
    }

    #[test]
    fn formatted_body_is_stripped_of_markup() {
        let directory = HashMap::new();
        let event = RawEvent::Json(json!({
            "event_id": "$f1",
            "sender": "@alice:example.org",
            "type": "m.room.message",
            "origin_server_ts": 10,
            "content": {"formatted_body": "<b>bold</b> move"}
        }));
        let message = normalize(&event, &ctx(&directory));
        assert_eq!(message.body, "bold move");
    }

    #[test]
    fn display_name_prefers_directory_over_synthesis() {
        let mut directory = HashMap::new();
        directory.insert("@telegram_42:bridge.org".to_owned(), "Real Name".to_owned());
        let event = text_event("$e1", "@telegram_42:bridge.org", 10, "hi");
        let message = normalize(&event, &ctx(&directory));
        assert_eq!(message.sender_display_name, "Real Name");
    }

    #[test]
    fn synthesizes_bridge_user_names() {
        let directory = HashMap::new();
        let event = text_event("$e1", "@telegram_123456:bridge.org", 10, "hi");
        let message = normalize(&event, &ctx(&directory));
        assert_eq!(message.sender_display_name, "Telegram User 123456");

        let event = text_event("$e2", "@whatsapp_4915551234:bridge.org", 11, "hi");
        let message = normalize(&event, &ctx(&directory));
        assert_eq!(message.sender_display_name, "WhatsApp User 4915551234");
    }

    #[test]
    fn falls_back_to_bare_localpart() {
        let directory = HashMap::new();
        let event = text_event("$e1", "@plainuser:example.org", 10, "hi");
        let message = normalize(&event, &ctx(&directory));
        assert_eq!(message.sender_display_name, "plainuser");
    }

    #[test]
    fn carried_display_name_wins_when_distinct_from_sender() {
        let directory = HashMap::new();
        let event = RawEvent::Envelope(EventEnvelope {
            event_id: "$e1".into(),
            sender: "@alice:example.org".into(),
            event_type: "m.room.message".into(),
            origin_server_ts: 10,
            content: json!({"body": "hi"}),
            unsigned: Some(json!({"displayname": "Alice A."})),
        });
        let message = normalize(&event, &ctx(&directory));
        assert_eq!(message.sender_display_name, "Alice A.");
    }

    #[test]
    fn own_messages_are_always_read() {
        let directory = HashMap::new();
        let event = text_event("$e1", "@me:example.org", 1_700_000_099_000, "hi");
        let message = normalize(&event, &ctx(&directory));
        assert!(message.is_from_current_user);
        assert!(message.is_read);
    }

    #[test]
    fn foreign_messages_use_read_receipt_position() {
        let directory = HashMap::new();
        let read = text_event("$e1", "@alice:example.org", 1_700_000_000_000, "old");
        let unread = text_event("$e2", "@alice:example.org", 1_700_000_099_000, "new");

        assert!(normalize(&read, &ctx(&directory)).is_read);
        assert!(!normalize(&unread, &ctx(&directory)).is_read);
    }

    #[test]
    fn reaction_event_carries_annotation_ref() {
        let directory = HashMap::new();
        let event = RawEvent::Json(json!({
            "event_id": "$r1",
            "sender": "@u2:example.org",
            "type": "m.reaction",
            "origin_server_ts": 12,
            "content": {
                "m.relates_to": {"rel_type": "m.annotation", "event_id": "$e1", "key": "👍"}
            }
        }));
        let message = normalize(&event, &ctx(&directory));
        assert_eq!(message.kind, MessageKind::Reaction);
        let annotates = message.annotates.expect("annotation ref");
        assert_eq!(annotates.event_id, "$e1");
        assert_eq!(annotates.key, "👍");
    }

    #[test]
    fn id_less_event_gets_synthetic_id() {
        let directory = HashMap::new();
        let event = RawEvent::Stub(EventStub {
            sender: Some("@alice:example.org".into()),
            origin_server_ts: Some(10),
            ..EventStub::default()
        });
        let message = normalize(&event, &ctx(&directory));
        assert!(message.id.starts_with("local-"));
    }

    #[test]
    fn unusable_event_yields_error_fallback_instead_of_panicking() {
        let directory = HashMap::new();
        let event = RawEvent::Stub(EventStub::default());
        let message = normalize(&event, &ctx(&directory));
        assert_eq!(message.body, "Error processing message");
        assert!(message.id.starts_with("local-"));
    }
}
