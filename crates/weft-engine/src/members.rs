//! Short-TTL room member cache.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use weft_core::{EngineError, MemberRecord, sort_members_for_display};

use crate::{client::RoomHandle, now_ms};

const MEMBER_CACHE_TTL: Duration = Duration::from_secs(60);
/// Fewer local joined members than this signals an unhydrated lazy-loaded
/// roster and forces a server-side member fetch.
const LAZY_LOAD_THRESHOLD: usize = 5;

/// Joined and invited members of one room, sorted for presentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomMembers {
    pub joined: Vec<MemberRecord>,
    pub invited: Vec<MemberRecord>,
}

#[derive(Debug, Clone)]
struct CachedMembers {
    members: RoomMembers,
    fetched_at_ms: u64,
}

/// Resolves display names and power levels for room members with a short-TTL
/// cache keyed by room id.
pub struct MemberCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedMembers>>,
}

impl Default for MemberCache {
    fn default() -> Self {
        Self::new(MEMBER_CACHE_TTL)
    }
}

impl MemberCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Load members for a room, serving from cache when fresh.
    pub async fn load(
        &self,
        room: &Arc<dyn RoomHandle>,
        force_refresh: bool,
    ) -> Result<RoomMembers, EngineError> {
        let room_id = room.room_id().to_owned();
        let now = now_ms();

        if !force_refresh
            && let Some(entry) = self.entries.lock().await.get(&room_id)
            && now.saturating_sub(entry.fetched_at_ms) < self.ttl.as_millis() as u64
        {
            return Ok(entry.members.clone());
        }

        let mut joined = room.joined_members().await?;

        if joined.len() < LAZY_LOAD_THRESHOLD || force_refresh {
            match room.sync_members().await {
                Ok(membership_events) => {
                    if !room.apply_membership_events(&membership_events) {
                        debug!(%room_id, "membership update primitive unavailable; keeping local roster");
                    }
                    joined = room.joined_members().await?;
                }
                Err(err) => {
                    warn!(%room_id, error = %err, "server member fetch failed; using local roster");
                }
            }
        }

        let mut invited = room.invited_members().await.unwrap_or_default();
        sort_members_for_display(&mut joined);
        sort_members_for_display(&mut invited);

        let members = RoomMembers { joined, invited };
        self.entries.lock().await.insert(
            room_id,
            CachedMembers {
                members: members.clone(),
                fetched_at_ms: now,
            },
        );
        Ok(members)
    }

    /// Build a sender-id to display-name directory for normalization.
    pub async fn directory(&self, room: &Arc<dyn RoomHandle>) -> HashMap<String, String> {
        match self.load(room, false).await {
            Ok(members) => members
                .joined
                .iter()
                .chain(members.invited.iter())
                .map(|member| (member.user_id.clone(), member.display_name.clone()))
                .collect(),
            Err(err) => {
                warn!(room_id = room.room_id(), error = %err, "member directory unavailable");
                HashMap::new()
            }
        }
    }

    /// Drop the cached entry; the next load refreshes unconditionally.
    pub async fn invalidate(&self, room_id: &str) {
        self.entries.lock().await.remove(room_id);
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}
