//! Multi-source timeline reconciliation.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use weft_core::{
    CanonicalMessage, MergeBuffer, RawEvent, RoomContext, RoomTimelineCacheEntry, attach_reactions,
    normalize, sort_by_timestamp,
};

use crate::{
    cache::MessageCache,
    client::{ChatClient, PaginationDirection, RoomHandle},
    members::MemberCache,
    now_ms,
    refresh::SessionRefresher,
};

const DEFAULT_LOAD_LIMIT: u16 = 50;

/// Options for one timeline load.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub limit: u16,
    pub direction: PaginationDirection,
    /// Opaque cursor for fetching earlier history.
    pub from_token: Option<String>,
    /// Bypass the cache and run the full multi-source path, including a
    /// forced room resync.
    pub force_refresh: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LOAD_LIMIT,
            direction: PaginationDirection::Backward,
            from_token: None,
            force_refresh: false,
        }
    }
}

/// Pulls room history and live events across overlapping unreliable sources,
/// deduplicates by event identity, attaches reactions, and keeps a per-room
/// cache warm.
///
/// Every source step degrades independently: a failing fetch is logged and
/// skipped, never propagated. The load only comes back empty when the room
/// itself cannot be resolved or no client is available, and then it fails
/// closed rather than erroring; callers render "no messages".
pub struct MessageEngine {
    refresher: Arc<SessionRefresher>,
    cache: Arc<dyn MessageCache>,
    members: Arc<MemberCache>,
    timelines: Mutex<HashMap<String, RoomTimelineCacheEntry>>,
    cache_first: bool,
}

impl MessageEngine {
    pub fn new(
        refresher: Arc<SessionRefresher>,
        cache: Arc<dyn MessageCache>,
        members: Arc<MemberCache>,
        cache_first: bool,
    ) -> Self {
        Self {
            refresher,
            cache,
            members,
            timelines: Mutex::new(HashMap::new()),
            cache_first,
        }
    }

    pub fn members(&self) -> &Arc<MemberCache> {
        &self.members
    }

    /// Load the reconciled, time-sorted message list for a room.
    pub async fn load_messages(&self, room_id: &str, options: LoadOptions) -> Vec<CanonicalMessage> {
        if self.cache_first && !options.force_refresh {
            let cached = self
                .cache
                .cached_messages(room_id, usize::from(options.limit.max(1)), None)
                .await;
            if !cached.is_empty() {
                debug!(room_id, count = cached.len(), "serving cached messages");
                return cached;
            }
        }

        let client = match self.refresher.ensure_valid().await {
            Ok(client) => client,
            Err(err) => {
                warn!(room_id, error = %err, "no valid session for load");
                match self.refresher.current_client().await {
                    Some(client) => client,
                    None => return Vec::new(),
                }
            }
        };

        let Some(room) = client.get_room(room_id) else {
            debug!(room_id, "room not resolvable; returning empty timeline");
            return Vec::new();
        };

        let buffer = self.gather(&client, room_id, &options).await;
        self.finalize(&client, &room, room_id, buffer, &options).await
    }

    /// Accumulate raw events from every source, deduplicating by identity.
    async fn gather(
        &self,
        client: &Arc<dyn ChatClient>,
        room_id: &str,
        options: &LoadOptions,
    ) -> MergeBuffer {
        let limit = usize::from(options.limit.max(1));
        let wide_limit = options.limit.max(1).saturating_mul(2);
        let mut buffer = MergeBuffer::new();

        // Live timeline first; one backfill when it is short of the limit.
        if let Some(room) = client.get_room(room_id) {
            buffer.merge(room.live_events());
        }
        if buffer.len() < limit {
            match client
                .fetch_history(room_id, None, options.limit, PaginationDirection::Backward)
                .await
            {
                Ok(page) => {
                    buffer.merge(page.chunk);
                }
                Err(err) => warn!(room_id, error = %err, "live-timeline backfill failed"),
            }
        }

        // Unconditional cross-check against direct history: the live timeline
        // can undercount events the sync loop has not buffered yet.
        match client
            .fetch_history(room_id, None, wide_limit, PaginationDirection::Backward)
            .await
        {
            Ok(page) => {
                buffer.merge(page.chunk);
            }
            Err(err) => warn!(room_id, error = %err, "direct history fetch failed"),
        }

        if options.force_refresh {
            match client.resync_room(room_id, wide_limit).await {
                Ok(page) => {
                    buffer.merge(page.chunk);
                }
                Err(err) => warn!(room_id, error = %err, "forced resync failed"),
            }
        }

        if let Some(token) = options.from_token.as_deref()
            && buffer.len() < limit.saturating_mul(3) / 2
        {
            match client
                .fetch_history(room_id, Some(token), options.limit, options.direction)
                .await
            {
                Ok(page) => {
                    buffer.merge(page.chunk);
                }
                Err(err) => warn!(room_id, error = %err, "token continuation fetch failed"),
            }
        }

        // Resolve reaction targets that no source delivered. Each fetch is
        // best-effort and fails independently.
        for target in buffer.unresolved_annotation_targets() {
            match client.fetch_event(room_id, &target).await {
                Ok(event) => {
                    buffer.merge([event]);
                }
                Err(err) => debug!(room_id, %target, error = %err, "reaction target fetch failed"),
            }
        }

        buffer
    }

    /// Normalize, attach reactions, sort, and persist the accumulated set.
    async fn finalize(
        &self,
        client: &Arc<dyn ChatClient>,
        room: &Arc<dyn RoomHandle>,
        room_id: &str,
        buffer: MergeBuffer,
        options: &LoadOptions,
    ) -> Vec<CanonicalMessage> {
        let directory = self.members.directory(room).await;
        let read_receipt_ts = room.read_receipt_ts(client.user_id()).await;
        let now = now_ms();

        let ctx = RoomContext {
            room_id,
            own_user_id: client.user_id(),
            now_ms: now,
            read_receipt_ts,
            directory: &directory,
        };

        let mut raw_events = buffer.into_events();
        raw_events.sort_by_key(|event| event.timestamp_ms().unwrap_or(u64::MAX));

        let normalized: Vec<CanonicalMessage> = raw_events
            .iter()
            .map(|event| normalize(event, &ctx))
            .collect();
        let mut messages = attach_reactions(normalized);
        sort_by_timestamp(&mut messages);

        self.cache.cache_messages(room_id, &messages).await;
        self.replace_timeline_entry(room_id, raw_events, options, now)
            .await;

        messages
    }

    /// Replace (never merge) the per-room raw-event cache entry. This is the
    /// last step of the load chain so overlapping loads stay last-write-wins.
    async fn replace_timeline_entry(
        &self,
        room_id: &str,
        events: Vec<RawEvent>,
        options: &LoadOptions,
        now: u64,
    ) {
        let entry = RoomTimelineCacheEntry {
            // More history is assumed upstream unless this was a shallow load
            // that came back under the requested limit.
            has_more: events.len() >= usize::from(options.limit.max(1)),
            events,
            last_updated_ms: now,
        };
        self.timelines.lock().await.insert(room_id.to_owned(), entry);
    }

    /// Snapshot of the per-room raw-event cache entry.
    pub async fn timeline_entry(&self, room_id: &str) -> Option<RoomTimelineCacheEntry> {
        self.timelines.lock().await.get(room_id).cloned()
    }

    /// Send a message through a validated session; returns the new event id.
    pub async fn send_message(
        &self,
        room_id: &str,
        body: &str,
    ) -> Result<String, weft_core::EngineError> {
        let client = self.refresher.ensure_valid().await?;
        client.send_message(room_id, body).await
    }

    /// Drop all per-room caches; used on session teardown.
    pub async fn clear(&self) {
        self.timelines.lock().await.clear();
        self.members.clear().await;
    }
}
