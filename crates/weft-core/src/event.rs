use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fully typed event wrapper produced by the protocol client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    pub event_id: String,
    pub sender: String,
    pub event_type: String,
    pub origin_server_ts: u64,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsigned: Option<Value>,
}

/// Partially-hydrated event stub; some fields never arrived.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventStub {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_server_ts: Option<u64>,
}

/// Single tagged union covering every raw event representation the engine
/// accepts.
///
/// Events are mapped into this union immediately at the ingestion boundary;
/// downstream logic never inspects source-specific shapes. Field accessors
/// resolve the richest shape first, then flat wire fields, then fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum RawEvent {
    /// Fully deserialized event from the client's live timeline.
    Envelope(EventEnvelope),
    /// Raw wire JSON, e.g. a REST history chunk entry.
    Json(Value),
    /// Partially-hydrated stub.
    Stub(EventStub),
}

impl RawEvent {
    /// Identity key used for merge deduplication.
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::Envelope(envelope) => Some(envelope.event_id.as_str()),
            Self::Json(value) => value
                .get("event_id")
                .and_then(Value::as_str)
                .or_else(|| value.get("id").and_then(Value::as_str)),
            Self::Stub(stub) => stub.event_id.as_deref(),
        }
    }

    pub fn sender(&self) -> Option<&str> {
        match self {
            Self::Envelope(envelope) => Some(envelope.sender.as_str()),
            Self::Json(value) => value
                .get("sender")
                .and_then(Value::as_str)
                .or_else(|| value.get("user_id").and_then(Value::as_str)),
            Self::Stub(stub) => stub.sender.as_deref(),
        }
    }

    pub fn timestamp_ms(&self) -> Option<u64> {
        match self {
            Self::Envelope(envelope) => Some(envelope.origin_server_ts),
            Self::Json(value) => value
                .get("origin_server_ts")
                .and_then(Value::as_u64)
                .or_else(|| value.get("timestamp").and_then(Value::as_u64)),
            Self::Stub(stub) => stub.origin_server_ts,
        }
    }

    pub fn event_type(&self) -> Option<&str> {
        match self {
            Self::Envelope(envelope) => Some(envelope.event_type.as_str()),
            Self::Json(value) => value.get("type").and_then(Value::as_str),
            Self::Stub(stub) => stub.event_type.as_deref(),
        }
    }

    pub fn content(&self) -> Option<&Value> {
        match self {
            Self::Envelope(envelope) => Some(&envelope.content),
            Self::Json(value) => value.get("content"),
            Self::Stub(_) => None,
        }
    }

    /// The `m.relates_to` relation block, when present.
    pub fn relates_to(&self) -> Option<&Value> {
        self.content().and_then(|content| content.get("m.relates_to"))
    }

    /// Target event id of an annotation relation.
    pub fn annotation_target(&self) -> Option<(&str, &str)> {
        let relation = self.relates_to()?;
        if relation.get("rel_type").and_then(Value::as_str) != Some("m.annotation") {
            return None;
        }
        let target = relation.get("event_id").and_then(Value::as_str)?;
        let key = relation.get("key").and_then(Value::as_str)?;
        Some((target, key))
    }

    /// Event id this event replies to, when it carries an in-reply-to relation.
    pub fn reply_target(&self) -> Option<&str> {
        self.relates_to()?
            .get("m.in_reply_to")
            .and_then(|reply| reply.get("event_id"))
            .and_then(Value::as_str)
    }
}
