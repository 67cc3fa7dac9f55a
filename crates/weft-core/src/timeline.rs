use std::collections::HashSet;

use crate::{
    event::RawEvent,
    types::{CanonicalMessage, MessageKind, Reaction},
};

/// Accumulates raw events from multiple overlapping sources, deduplicating by
/// event identity.
///
/// Later sources never override an already-present event; accumulation order
/// is not the final order (sorting happens during finalization). Events
/// without an identity key are admitted unconditionally.
#[derive(Debug, Default)]
pub struct MergeBuffer {
    events: Vec<RawEvent>,
    seen: HashSet<String>,
}

impl MergeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of raw events; returns how many were newly admitted.
    pub fn merge(&mut self, source: impl IntoIterator<Item = RawEvent>) -> usize {
        let mut admitted = 0;
        for event in source {
            match event.event_id() {
                Some(id) => {
                    if self.seen.contains(id) {
                        continue;
                    }
                    self.seen.insert(id.to_owned());
                }
                None => {}
            }
            self.events.push(event);
            admitted += 1;
        }
        admitted
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.seen.contains(event_id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[RawEvent] {
        &self.events
    }

    /// Event ids referenced by accumulated annotation events whose targets are
    /// not themselves present in the buffer.
    pub fn unresolved_annotation_targets(&self) -> Vec<String> {
        let mut missing = Vec::new();
        let mut requested = HashSet::new();
        for event in &self.events {
            if let Some((target, _key)) = event.annotation_target()
                && !self.seen.contains(target)
                && requested.insert(target.to_owned())
            {
                missing.push(target.to_owned());
            }
        }
        missing
    }

    pub fn into_events(self) -> Vec<RawEvent> {
        self.events
    }
}

/// Move reaction-kind messages into their parents' `reactions` lists.
///
/// Reactions whose parent is absent even after target resolution are dropped;
/// they are not independently displayable. `(key, sender)` stays unique per
/// parent.
pub fn attach_reactions(messages: Vec<CanonicalMessage>) -> Vec<CanonicalMessage> {
    let mut reactions = Vec::new();
    let mut kept: Vec<CanonicalMessage> = Vec::with_capacity(messages.len());

    for message in messages {
        if message.kind == MessageKind::Reaction {
            if let Some(annotates) = message.annotates {
                reactions.push((
                    annotates.event_id,
                    Reaction {
                        key: annotates.key,
                        sender: message.sender,
                        timestamp_ms: message.timestamp_ms,
                    },
                ));
            }
            continue;
        }
        kept.push(message);
    }

    for (target, reaction) in reactions {
        if let Some(parent) = kept.iter_mut().find(|message| message.id == target) {
            parent.push_reaction(reaction);
        }
    }

    kept
}

/// Sort strictly ascending by origin timestamp; ties keep accumulation order.
pub fn sort_by_timestamp(messages: &mut [CanonicalMessage]) {
    messages.sort_by_key(|message| message.timestamp_ms);
}
