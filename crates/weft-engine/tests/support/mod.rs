//! Scripted fake protocol client shared by the engine integration tests.
#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;

use weft_core::{
    EngineError, EngineErrorCategory, MemberRecord, MembershipState, RawEvent, SessionCredentials,
};
use weft_engine::{
    ChatClient, ClientFactory, ClientSignal, ConnectionState, HistoryChunk, PaginationDirection,
    RoomHandle,
};

pub const USER: &str = "@me:example.org";
pub const ROOM: &str = "!r1:example.org";

pub fn text_event(event_id: &str, sender: &str, ts: u64, body: &str) -> RawEvent {
    RawEvent::Json(json!({
        "event_id": event_id,
        "sender": sender,
        "type": "m.room.message",
        "origin_server_ts": ts,
        "content": {"msgtype": "m.text", "body": body}
    }))
}

pub fn reaction_event(event_id: &str, sender: &str, ts: u64, target: &str, key: &str) -> RawEvent {
    RawEvent::Json(json!({
        "event_id": event_id,
        "sender": sender,
        "type": "m.reaction",
        "origin_server_ts": ts,
        "content": {
            "m.relates_to": {"rel_type": "m.annotation", "event_id": target, "key": key}
        }
    }))
}

pub fn member(user_id: &str, name: &str, power: i64) -> MemberRecord {
    MemberRecord {
        user_id: user_id.into(),
        display_name: name.into(),
        avatar_ref: None,
        power_level: power,
        membership: MembershipState::Joined,
    }
}

pub fn credentials(user_id: &str, token: &str) -> SessionCredentials {
    SessionCredentials {
        user_id: user_id.into(),
        access_token: token.into(),
        device_id: "DEV1".into(),
        homeserver_url: "https://matrix.example.org".into(),
        password: None,
    }
}

fn network_error(message: &str) -> EngineError {
    EngineError::new(EngineErrorCategory::Network, "fake_network_error", message)
}

#[derive(Default, Debug)]
pub struct FakeRoom {
    pub room_id: String,
    pub live: Mutex<Vec<RawEvent>>,
    pub joined: Mutex<Vec<MemberRecord>>,
    pub invited: Mutex<Vec<MemberRecord>>,
    /// Raw membership events returned by the server member fetch.
    pub membership_events: Mutex<Vec<RawEvent>>,
    /// Roster installed when membership events are applied.
    pub server_roster: Mutex<Option<Vec<MemberRecord>>>,
    pub apply_supported: AtomicBool,
    pub receipt_ts: Mutex<Option<u64>>,
    pub sync_member_calls: AtomicUsize,
}

impl FakeRoom {
    pub fn new(room_id: &str) -> Arc<Self> {
        Arc::new(Self {
            room_id: room_id.to_owned(),
            apply_supported: AtomicBool::new(true),
            ..Self::default()
        })
    }
}

#[async_trait]
impl RoomHandle for FakeRoom {
    fn room_id(&self) -> &str {
        &self.room_id
    }

    fn live_events(&self) -> Vec<RawEvent> {
        self.live.lock().unwrap().clone()
    }

    async fn joined_members(&self) -> Result<Vec<MemberRecord>, EngineError> {
        Ok(self.joined.lock().unwrap().clone())
    }

    async fn invited_members(&self) -> Result<Vec<MemberRecord>, EngineError> {
        Ok(self.invited.lock().unwrap().clone())
    }

    async fn sync_members(&self) -> Result<Vec<RawEvent>, EngineError> {
        self.sync_member_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.membership_events.lock().unwrap().clone())
    }

    fn apply_membership_events(&self, _events: &[RawEvent]) -> bool {
        if !self.apply_supported.load(Ordering::SeqCst) {
            return false;
        }
        if let Some(roster) = self.server_roster.lock().unwrap().clone() {
            *self.joined.lock().unwrap() = roster;
        }
        true
    }

    async fn read_receipt_ts(&self, _user_id: &str) -> Option<u64> {
        *self.receipt_ts.lock().unwrap()
    }
}

#[derive(Debug)]
pub struct FakeClient {
    pub user_id: String,
    pub state: Mutex<ConnectionState>,
    pub rooms: Mutex<HashMap<String, Arc<FakeRoom>>>,
    /// History pages keyed by pagination token (`None` is the live edge).
    pub history_pages: Mutex<HashMap<Option<String>, HistoryChunk>>,
    pub resync_chunk: Mutex<Option<HistoryChunk>>,
    pub events_by_id: Mutex<HashMap<String, RawEvent>>,
    pub whoami_error: Mutex<Option<EngineError>>,
    pub fail_history: AtomicBool,
    pub history_calls: AtomicUsize,
    pub history_tokens: Mutex<Vec<Option<String>>>,
    pub resync_calls: AtomicUsize,
    pub fetch_event_calls: AtomicUsize,
    pub whoami_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub stopped: AtomicBool,
    pub signal_tx: broadcast::Sender<ClientSignal>,
}

impl FakeClient {
    pub fn new(user_id: &str) -> Arc<Self> {
        let (signal_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            user_id: user_id.to_owned(),
            state: Mutex::new(ConnectionState::Ready),
            rooms: Mutex::new(HashMap::new()),
            history_pages: Mutex::new(HashMap::new()),
            resync_chunk: Mutex::new(None),
            events_by_id: Mutex::new(HashMap::new()),
            whoami_error: Mutex::new(None),
            fail_history: AtomicBool::new(false),
            history_calls: AtomicUsize::new(0),
            history_tokens: Mutex::new(Vec::new()),
            resync_calls: AtomicUsize::new(0),
            fetch_event_calls: AtomicUsize::new(0),
            whoami_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            signal_tx,
        })
    }

    pub fn add_room(self: &Arc<Self>, room: Arc<FakeRoom>) {
        self.rooms
            .lock()
            .unwrap()
            .insert(room.room_id.clone(), room);
    }

    pub fn set_history_page(&self, token: Option<&str>, chunk: Vec<RawEvent>, next: Option<&str>) {
        self.history_pages.lock().unwrap().insert(
            token.map(ToOwned::to_owned),
            HistoryChunk {
                chunk,
                next_token: next.map(ToOwned::to_owned),
            },
        );
    }

    pub fn set_resync(&self, chunk: Vec<RawEvent>) {
        *self.resync_chunk.lock().unwrap() = Some(HistoryChunk {
            chunk,
            next_token: None,
        });
    }

    pub fn add_fetchable_event(&self, event_id: &str, event: RawEvent) {
        self.events_by_id
            .lock()
            .unwrap()
            .insert(event_id.to_owned(), event);
    }

    pub fn network_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
            + self.resync_calls.load(Ordering::SeqCst)
            + self.fetch_event_calls.load(Ordering::SeqCst)
            + self.whoami_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatClient for FakeClient {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn get_room(&self, room_id: &str) -> Option<Arc<dyn RoomHandle>> {
        self.rooms
            .lock()
            .unwrap()
            .get(room_id)
            .cloned()
            .map(|room| room as Arc<dyn RoomHandle>)
    }

    async fn fetch_history(
        &self,
        _room_id: &str,
        from_token: Option<&str>,
        _limit: u16,
        _direction: PaginationDirection,
    ) -> Result<HistoryChunk, EngineError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.history_tokens
            .lock()
            .unwrap()
            .push(from_token.map(ToOwned::to_owned));
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(network_error("scripted history failure"));
        }
        Ok(self
            .history_pages
            .lock()
            .unwrap()
            .get(&from_token.map(ToOwned::to_owned))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_event(&self, _room_id: &str, event_id: &str) -> Result<RawEvent, EngineError> {
        self.fetch_event_calls.fetch_add(1, Ordering::SeqCst);
        self.events_by_id
            .lock()
            .unwrap()
            .get(event_id)
            .cloned()
            .ok_or_else(|| network_error("scripted event miss"))
    }

    async fn resync_room(&self, _room_id: &str, _limit: u16) -> Result<HistoryChunk, EngineError> {
        self.resync_calls.fetch_add(1, Ordering::SeqCst);
        self.resync_chunk
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| network_error("scripted resync miss"))
    }

    async fn send_message(&self, _room_id: &str, _body: &str) -> Result<String, EngineError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("$sent-{}", self.send_calls.load(Ordering::SeqCst)))
    }

    async fn whoami(&self) -> Result<String, EngineError> {
        self.whoami_calls.fetch_add(1, Ordering::SeqCst);
        match self.whoami_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(self.user_id.clone()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ClientSignal> {
        self.signal_tx.subscribe()
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

pub struct FakeFactory {
    pub prepared: Mutex<VecDeque<Arc<FakeClient>>>,
    pub build_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub fail_builds: AtomicBool,
    /// Scripted build latency; lets tests overlap concurrent refreshes.
    pub build_delay: Mutex<Option<Duration>>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            prepared: Mutex::new(VecDeque::new()),
            build_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            fail_builds: AtomicBool::new(false),
            build_delay: Mutex::new(None),
        })
    }

    pub fn prepare(self: &Arc<Self>, client: Arc<FakeClient>) {
        self.prepared.lock().unwrap().push_back(client);
    }

    pub fn set_build_delay(&self, delay: Duration) {
        *self.build_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl ClientFactory for FakeFactory {
    async fn build(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<Arc<dyn ChatClient>, EngineError> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.build_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_builds.load(Ordering::SeqCst) {
            return Err(network_error("scripted build failure"));
        }
        let client = self
            .prepared
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| FakeClient::new(&credentials.user_id));
        Ok(client as Arc<dyn ChatClient>)
    }

    async fn register(
        &self,
        username: &str,
        _password: &str,
    ) -> Result<SessionCredentials, EngineError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        Ok(credentials(
            &format!("@{username}:example.org"),
            "registered_token",
        ))
    }
}
