//! Reconciled-message cache collaborator.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use weft_core::CanonicalMessage;

/// Persists reconciled messages for fast reload.
///
/// Stored records are plain serializable data; the reconciler strips any
/// non-serializable state before handing messages over.
#[async_trait]
pub trait MessageCache: Send + Sync {
    /// Most recent cached messages for a room, ascending by timestamp,
    /// optionally restricted to messages older than `before_ts`.
    async fn cached_messages(
        &self,
        room_id: &str,
        limit: usize,
        before_ts: Option<u64>,
    ) -> Vec<CanonicalMessage>;

    /// Replace the cached message list for a room.
    async fn cache_messages(&self, room_id: &str, messages: &[CanonicalMessage]);

    async fn invalidate(&self, room_id: &str);
}

/// In-memory cache used by tests and as the default collaborator.
#[derive(Default)]
pub struct InMemoryMessageCache {
    rooms: RwLock<HashMap<String, Vec<CanonicalMessage>>>,
}

impl InMemoryMessageCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageCache for InMemoryMessageCache {
    async fn cached_messages(
        &self,
        room_id: &str,
        limit: usize,
        before_ts: Option<u64>,
    ) -> Vec<CanonicalMessage> {
        let rooms = self.rooms.read().await;
        let Some(messages) = rooms.get(room_id) else {
            return Vec::new();
        };

        let filtered: Vec<CanonicalMessage> = messages
            .iter()
            .filter(|message| before_ts.is_none_or(|bound| message.timestamp_ms < bound))
            .cloned()
            .collect();

        let start = filtered.len().saturating_sub(limit.max(1));
        filtered[start..].to_vec()
    }

    async fn cache_messages(&self, room_id: &str, messages: &[CanonicalMessage]) {
        let mut rooms = self.rooms.write().await;
        rooms.insert(room_id.to_owned(), messages.to_vec());
    }

    async fn invalidate(&self, room_id: &str) {
        let mut rooms = self.rooms.write().await;
        rooms.remove(room_id);
    }
}
