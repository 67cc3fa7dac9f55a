//! `matrix-sdk` implementation of the engine's protocol-client contract.

use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    sync::{Arc, Mutex as StdMutex},
};

use async_trait::async_trait;
use matrix_sdk::{
    Client, ClientBuildError, HttpError, Room, RoomMemberships, SessionTokens,
    authentication::matrix::MatrixSession,
    config::SyncSettings,
    room::MessagesOptions,
    ruma::{
        OwnedEventId, OwnedRoomId, OwnedUserId, UInt, serde::Raw,
        api::client::{
            account::register::v3 as register_api,
            error::{ErrorKind, RetryAfter},
            uiaa,
        },
        events::{
            AnySyncStateEvent, AnySyncTimelineEvent,
            receipt::{ReceiptThread, ReceiptType},
            room::{member::SyncRoomMemberEvent, message::RoomMessageEventContent},
        },
    },
};
use serde_json::Value;
use tokio::{
    sync::{Mutex, broadcast},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use weft_core::{
    EngineError, EngineErrorCategory, MemberRecord, MembershipState, RawEvent, RetryPolicy,
    SessionCredentials, classify_http_status,
};
use weft_engine::{
    ChatClient, ClientFactory, ClientSignal, ConnectionState, HistoryChunk, PaginationDirection,
    RoomHandle,
};

const DEFAULT_DEVICE_DISPLAY_NAME: &str = "Weftchat";
const SIGNAL_CHANNEL_CAPACITY: usize = 512;
/// Per-room cap on buffered live-timeline events.
const LIVE_BUFFER_CAP: usize = 256;

type LiveBuffers = Arc<StdMutex<HashMap<String, VecDeque<RawEvent>>>>;

/// Connection settings for building Matrix clients.
#[derive(Debug, Clone)]
pub struct MatrixClientConfig {
    pub homeserver: String,
    pub data_dir_root: PathBuf,
    pub store_passphrase: Option<String>,
}

impl MatrixClientConfig {
    pub fn new(
        homeserver: impl Into<String>,
        data_dir_root: impl Into<PathBuf>,
        store_passphrase: Option<String>,
    ) -> Self {
        Self {
            homeserver: homeserver.into(),
            data_dir_root: data_dir_root.into(),
            store_passphrase,
        }
    }

    /// Per-account SDK store directory.
    pub fn data_dir_for_account(&self, user_id: &str) -> PathBuf {
        self.data_dir_root
            .join(format!("user-{}", slugify_component(user_id, 64)))
    }
}

#[derive(Debug)]
struct RunningSyncTask {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// Live Matrix client wired into the engine's signal and live-buffer model.
#[derive(Debug)]
pub struct MatrixChatClient {
    client: Client,
    user_id: String,
    state: Arc<StdMutex<ConnectionState>>,
    live: LiveBuffers,
    signal_tx: broadcast::Sender<ClientSignal>,
    sync_task: Mutex<Option<RunningSyncTask>>,
}

impl MatrixChatClient {
    /// Install event handlers and start the sync loop on an authenticated
    /// client.
    pub fn start(client: Client, user_id: String) -> Arc<Self> {
        let (signal_tx, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        let this = Arc::new(Self {
            client,
            user_id,
            state: Arc::new(StdMutex::new(ConnectionState::Connecting)),
            live: Arc::new(StdMutex::new(HashMap::new())),
            signal_tx,
            sync_task: Mutex::new(None),
        });

        this.install_event_handlers();
        this.spawn_sync_loop();
        this
    }

    fn install_event_handlers(&self) {
        let live = Arc::clone(&self.live);
        let timeline_tx = self.signal_tx.clone();
        self.client
            .add_event_handler(move |event: Raw<AnySyncTimelineEvent>, room: Room| {
                let live = Arc::clone(&live);
                let timeline_tx = timeline_tx.clone();
                async move {
                    let room_id = room.room_id().to_string();
                    match serde_json::from_str::<Value>(event.json().get()) {
                        Ok(value) => {
                            buffer_live_event(&live, &room_id, RawEvent::Json(value));
                            let _ = timeline_tx.send(ClientSignal::RoomTimelineUpdated { room_id });
                        }
                        Err(err) => {
                            warn!(%room_id, error = %err, "failed to serialize live timeline event");
                        }
                    }
                }
            });

        let member_tx = self.signal_tx.clone();
        self.client
            .add_event_handler(move |_event: SyncRoomMemberEvent, room: Room| {
                let member_tx = member_tx.clone();
                async move {
                    let _ = member_tx.send(ClientSignal::MembershipChanged {
                        room_id: room.room_id().to_string(),
                    });
                }
            });

        let state_tx = self.signal_tx.clone();
        self.client
            .add_event_handler(move |_event: AnySyncStateEvent, room: Room| {
                let state_tx = state_tx.clone();
                async move {
                    let _ = state_tx.send(ClientSignal::RoomStateChanged {
                        room_id: room.room_id().to_string(),
                    });
                }
            });
    }

    /// Continuous sync with backoff; token-shaped failures surface as a
    /// logout signal instead of endless retries.
    fn spawn_sync_loop(&self) {
        let stop = CancellationToken::new();
        let stop_child = stop.child_token();
        let client = self.client.clone();
        let signal_tx = self.signal_tx.clone();
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            let retry_policy = RetryPolicy::default().with_jitter(250);
            let mut attempt: u32 = 0;
            let mut first_sync_seen = false;
            let mut sync_settings = SyncSettings::default();

            loop {
                tokio::select! {
                    _ = stop_child.cancelled() => break,
                    sync_result = client.sync_once(sync_settings.clone()) => {
                        match sync_result {
                            Ok(response) => {
                                attempt = 0;
                                sync_settings = sync_settings.token(response.next_batch);
                                set_state(&state, &signal_tx, ConnectionState::Ready);
                                if !first_sync_seen {
                                    first_sync_seen = true;
                                    let _ = signal_tx.send(ClientSignal::SyncReady);
                                }
                            }
                            Err(err) => {
                                let mapped = map_matrix_error(err);
                                set_state(&state, &signal_tx, ConnectionState::Error);

                                if mapped.is_token_invalid() {
                                    warn!(error = %mapped, "sync rejected the session token");
                                    let _ = signal_tx.send(ClientSignal::LoggedOut);
                                    break;
                                }
                                if !is_recoverable_sync_error(&mapped) {
                                    warn!(error = %mapped, "sync failed with unrecoverable error");
                                    break;
                                }

                                let delay =
                                    retry_policy.delay_for_attempt(attempt, mapped.retry_after_ms);
                                attempt = attempt.saturating_add(1);
                                debug!(delay_ms = delay.as_millis() as u64, "sync retry scheduled");

                                tokio::select! {
                                    _ = stop_child.cancelled() => break,
                                    _ = tokio::time::sleep(delay) => {}
                                }
                            }
                        }
                    }
                }
            }
        });

        let sync_task = RunningSyncTask { stop, task };
        let slot = self.sync_task.try_lock();
        match slot {
            Ok(mut guard) => *guard = Some(sync_task),
            Err(_) => {
                warn!("sync task slot was busy during startup");
                sync_task.stop.cancel();
                sync_task.task.abort();
            }
        }
    }

    fn lookup_room(&self, room_id: &str) -> Result<Room, EngineError> {
        let room_id = parse_room_id(room_id)?;
        self.client
            .get_room(&room_id)
            .ok_or_else(|| EngineError::room_not_found(room_id.as_str()))
    }
}

#[async_trait]
impl ChatClient for MatrixChatClient {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn connection_state(&self) -> ConnectionState {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn get_room(&self, room_id: &str) -> Option<Arc<dyn RoomHandle>> {
        let parsed = room_id.parse::<OwnedRoomId>().ok()?;
        let room = self.client.get_room(&parsed)?;
        Some(Arc::new(MatrixRoomHandle {
            room_id: room_id.to_owned(),
            room,
            live: Arc::clone(&self.live),
        }))
    }

    async fn fetch_history(
        &self,
        room_id: &str,
        from_token: Option<&str>,
        limit: u16,
        direction: PaginationDirection,
    ) -> Result<HistoryChunk, EngineError> {
        let room = self.lookup_room(room_id)?;
        let messages = room
            .messages(messages_options(from_token, limit, direction)?)
            .await
            .map_err(map_matrix_error)?;

        let chunk = messages
            .chunk
            .iter()
            .filter_map(|event| raw_event_from_timeline_event(event))
            .collect();
        Ok(HistoryChunk {
            chunk,
            next_token: messages.end,
        })
    }

    async fn fetch_event(&self, room_id: &str, event_id: &str) -> Result<RawEvent, EngineError> {
        let room = self.lookup_room(room_id)?;
        let event_id = parse_event_id(event_id)?;
        let event = room
            .event(&event_id, None)
            .await
            .map_err(map_matrix_error)?;

        raw_event_from_timeline_event(&event).ok_or_else(|| {
            EngineError::new(
                EngineErrorCategory::Serialization,
                "event_deserialize_error",
                format!("event {event_id} could not be decoded"),
            )
        })
    }

    async fn resync_room(&self, room_id: &str, limit: u16) -> Result<HistoryChunk, EngineError> {
        // Bootstrap chunk: a fresh backward page from the live edge, ignoring
        // any cached pagination state.
        let room = self.lookup_room(room_id)?;
        let messages = room
            .messages(messages_options(None, limit, PaginationDirection::Backward)?)
            .await
            .map_err(map_matrix_error)?;

        let chunk = messages
            .chunk
            .iter()
            .filter_map(|event| raw_event_from_timeline_event(event))
            .collect();
        Ok(HistoryChunk {
            chunk,
            next_token: messages.end,
        })
    }

    async fn send_message(&self, room_id: &str, body: &str) -> Result<String, EngineError> {
        let room = self.lookup_room(room_id)?;
        let response = room
            .send(RoomMessageEventContent::text_plain(body))
            .await
            .map_err(map_matrix_error)?;
        Ok(response.event_id.to_string())
    }

    async fn whoami(&self) -> Result<String, EngineError> {
        let response = self.client.whoami().await.map_err(map_matrix_http_error)?;
        Ok(response.user_id.to_string())
    }

    fn session_credentials(&self) -> Option<SessionCredentials> {
        let session = self.client.matrix_auth().session()?;
        Some(SessionCredentials {
            user_id: session.meta.user_id.to_string(),
            access_token: session.tokens.access_token.clone(),
            device_id: session.meta.device_id.to_string(),
            homeserver_url: self.client.homeserver().to_string(),
            password: None,
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<ClientSignal> {
        self.signal_tx.subscribe()
    }

    async fn stop(&self) {
        let running = {
            let mut guard = self.sync_task.lock().await;
            guard.take()
        };
        if let Some(running) = running {
            running.stop.cancel();
            let _ = running.task.await;
        }
        self.live
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        info!(user_id = %self.user_id, "matrix client stopped");
    }
}

struct MatrixRoomHandle {
    room_id: String,
    room: Room,
    live: LiveBuffers,
}

#[async_trait]
impl RoomHandle for MatrixRoomHandle {
    fn room_id(&self) -> &str {
        &self.room_id
    }

    fn live_events(&self) -> Vec<RawEvent> {
        self.live
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&self.room_id)
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn joined_members(&self) -> Result<Vec<MemberRecord>, EngineError> {
        let members = self
            .room
            .members_no_sync(RoomMemberships::JOIN)
            .await
            .map_err(map_matrix_error)?;
        Ok(members
            .iter()
            .map(|member| member_record(member, MembershipState::Joined))
            .collect())
    }

    async fn invited_members(&self) -> Result<Vec<MemberRecord>, EngineError> {
        let members = self
            .room
            .members_no_sync(RoomMemberships::INVITE)
            .await
            .map_err(map_matrix_error)?;
        Ok(members
            .iter()
            .map(|member| member_record(member, MembershipState::Invited))
            .collect())
    }

    async fn sync_members(&self) -> Result<Vec<RawEvent>, EngineError> {
        // In matrix-sdk 0.11 `Room::sync_members` returns `()`: the server
        // response is applied to the SDK store internally and the member
        // chunk is no longer surfaced to callers. The fetch side effect is
        // what matters here; the returned events are consumed only by the
        // no-op `apply_membership_events`.
        self.room.sync_members().await.map_err(map_matrix_error)?;
        Ok(Vec::new())
    }

    fn apply_membership_events(&self, _events: &[RawEvent]) -> bool {
        // The SDK store applies membership during the server fetch itself;
        // there is no separate update primitive to call here.
        true
    }

    async fn read_receipt_ts(&self, user_id: &str) -> Option<u64> {
        let user_id = user_id.parse::<OwnedUserId>().ok()?;
        let receipt = self
            .room
            .load_user_receipt(ReceiptType::Read, ReceiptThread::Unthreaded, &user_id)
            .await
            .ok()??;
        receipt.1.ts.map(|ts| u64::from(ts.get()))
    }
}

/// Builds authenticated Matrix clients from session credentials.
pub struct MatrixClientFactory {
    config: MatrixClientConfig,
}

impl MatrixClientFactory {
    pub fn new(config: MatrixClientConfig) -> Self {
        Self { config }
    }

    async fn build_sdk_client(&self, homeserver: &str, user_id: &str) -> Result<Client, EngineError> {
        let homeserver = if homeserver.is_empty() {
            &self.config.homeserver
        } else {
            homeserver
        };
        Client::builder()
            .homeserver_url(homeserver)
            .sqlite_store(
                self.config.data_dir_for_account(user_id),
                self.config.store_passphrase.as_deref(),
            )
            .build()
            .await
            .map_err(map_client_build_error)
    }
}

#[async_trait]
impl ClientFactory for MatrixClientFactory {
    async fn build(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<Arc<dyn ChatClient>, EngineError> {
        let client = self
            .build_sdk_client(&credentials.homeserver_url, &credentials.user_id)
            .await?;

        // A retained password always wins: logging in fresh rotates a token
        // the server may already have expired.
        if let Some(password) = &credentials.password {
            client
                .matrix_auth()
                .login_username(&credentials.user_id, password)
                .initial_device_display_name(DEFAULT_DEVICE_DISPLAY_NAME)
                .send()
                .await
                .map_err(map_matrix_error)?;
        } else if !credentials.access_token.is_empty() {
            let session = MatrixSession {
                meta: matrix_sdk::SessionMeta {
                    user_id: parse_user_id(&credentials.user_id)?,
                    device_id: credentials.device_id.clone().into(),
                },
                tokens: SessionTokens {
                    access_token: credentials.access_token.clone(),
                    refresh_token: None,
                },
            };
            client
                .restore_session(session)
                .await
                .map_err(map_matrix_error)?;
        } else {
            return Err(EngineError::no_credentials_found(&credentials.user_id));
        }

        Ok(MatrixChatClient::start(client, credentials.user_id.clone()) as Arc<dyn ChatClient>)
    }

    async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<SessionCredentials, EngineError> {
        let client = self
            .build_sdk_client(&self.config.homeserver, username)
            .await?;

        let mut request = register_api::Request::new();
        request.username = Some(username.to_owned());
        request.password = Some(password.to_owned());
        request.initial_device_display_name = Some(DEFAULT_DEVICE_DISPLAY_NAME.to_owned());
        request.auth = Some(uiaa::AuthData::Dummy(uiaa::Dummy::new()));

        let response = client
            .matrix_auth()
            .register(request)
            .await
            .map_err(map_matrix_error)?;

        Ok(SessionCredentials {
            user_id: response.user_id.to_string(),
            access_token: response.access_token.unwrap_or_default(),
            device_id: response
                .device_id
                .map(|device_id| device_id.to_string())
                .unwrap_or_default(),
            homeserver_url: self.config.homeserver.clone(),
            password: Some(password.to_owned()),
        })
    }
}

fn buffer_live_event(live: &LiveBuffers, room_id: &str, event: RawEvent) {
    let mut buffers = live
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let buffer = buffers.entry(room_id.to_owned()).or_default();
    buffer.push_back(event);
    while buffer.len() > LIVE_BUFFER_CAP {
        buffer.pop_front();
    }
}

fn set_state(
    state: &Arc<StdMutex<ConnectionState>>,
    signal_tx: &broadcast::Sender<ClientSignal>,
    next: ConnectionState,
) {
    let mut current = state
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if *current != next {
        *current = next;
        let _ = signal_tx.send(ClientSignal::ConnectionStateChanged(next));
    }
}

fn member_record(member: &matrix_sdk::room::RoomMember, membership: MembershipState) -> MemberRecord {
    MemberRecord {
        user_id: member.user_id().to_string(),
        display_name: member.name().to_owned(),
        avatar_ref: member.avatar_url().map(|url| url.to_string()),
        power_level: member.power_level(),
        membership,
    }
}

fn raw_event_from_timeline_event(
    event: &matrix_sdk::deserialized_responses::TimelineEvent,
) -> Option<RawEvent> {
    serde_json::from_str::<Value>(event.raw().json().get())
        .ok()
        .map(RawEvent::Json)
}

fn messages_options(
    from_token: Option<&str>,
    limit: u16,
    direction: PaginationDirection,
) -> Result<MessagesOptions, EngineError> {
    let mut options = match direction {
        PaginationDirection::Backward => MessagesOptions::backward(),
        PaginationDirection::Forward => MessagesOptions::forward(),
    };
    options.from = from_token.map(ToOwned::to_owned);
    options.limit = UInt::new(u64::from(limit.max(1))).ok_or_else(|| {
        EngineError::new(
            EngineErrorCategory::Config,
            "invalid_pagination_limit",
            format!("invalid pagination limit: {limit}"),
        )
    })?;
    Ok(options)
}

fn parse_room_id(value: &str) -> Result<OwnedRoomId, EngineError> {
    value.parse::<OwnedRoomId>().map_err(|err| {
        EngineError::new(
            EngineErrorCategory::Config,
            "invalid_room_id",
            format!("invalid room id '{value}': {err}"),
        )
    })
}

fn parse_event_id(value: &str) -> Result<OwnedEventId, EngineError> {
    value.parse::<OwnedEventId>().map_err(|err| {
        EngineError::new(
            EngineErrorCategory::Config,
            "invalid_event_id",
            format!("invalid event id '{value}': {err}"),
        )
    })
}

fn parse_user_id(value: &str) -> Result<OwnedUserId, EngineError> {
    value.parse::<OwnedUserId>().map_err(|err| {
        EngineError::new(
            EngineErrorCategory::Config,
            "invalid_user_id",
            format!("invalid user id '{value}': {err}"),
        )
    })
}

fn is_recoverable_sync_error(err: &EngineError) -> bool {
    matches!(
        err.category,
        EngineErrorCategory::Network | EngineErrorCategory::RateLimited
    )
}

fn map_matrix_http_error(err: HttpError) -> EngineError {
    if let Some(client_err) = err.as_client_api_error() {
        let status = client_err.status_code.as_u16();
        let code = match client_err.error_kind() {
            Some(ErrorKind::UnknownToken { .. }) => "M_UNKNOWN_TOKEN",
            Some(ErrorKind::MissingToken) => "M_MISSING_TOKEN",
            _ => "matrix_http_error",
        };
        let mut mapped = EngineError::new(classify_http_status(status), code, client_err.to_string());

        if let Some(ErrorKind::LimitExceeded { retry_after }) = client_err.error_kind()
            && let Some(RetryAfter::Delay(delay)) = retry_after
        {
            mapped = mapped.with_retry_after(*delay);
        }

        mapped
    } else {
        EngineError::new(
            EngineErrorCategory::Network,
            "matrix_http_error",
            err.to_string(),
        )
    }
}

fn map_matrix_error(err: matrix_sdk::Error) -> EngineError {
    use matrix_sdk::Error;

    match err {
        Error::Http(http_err) => map_matrix_http_error(*http_err),
        Error::AuthenticationRequired => EngineError::new(
            EngineErrorCategory::Auth,
            "auth_required",
            "authentication required",
        ),
        Error::StateStore(_) | Error::EventCacheStore(_) | Error::Io(_) => {
            EngineError::new(
                EngineErrorCategory::Storage,
                "storage_error",
                err.to_string(),
            )
        }
        Error::SerdeJson(_) => EngineError::new(
            EngineErrorCategory::Serialization,
            "serde_json_error",
            err.to_string(),
        ),
        _ => EngineError::new(
            EngineErrorCategory::Internal,
            "matrix_error",
            err.to_string(),
        ),
    }
}

fn map_client_build_error(err: ClientBuildError) -> EngineError {
    EngineError::new(
        EngineErrorCategory::Config,
        "client_build_error",
        err.to_string(),
    )
}

fn slugify_component(input: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_len));
    let mut last_was_sep = false;
    for ch in input.chars() {
        let next = if ch.is_ascii_alphanumeric() {
            ch.to_ascii_lowercase()
        } else {
            '_'
        };

        if next == '_' {
            if last_was_sep {
                continue;
            }
            last_was_sep = true;
        } else {
            last_was_sep = false;
        }

        out.push(next);
        if out.len() >= max_len {
            break;
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "default".to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn rejects_invalid_room_id() {
        let err = parse_room_id("not-a-room-id").expect_err("invalid room id must fail");
        assert_eq!(err.code, "invalid_room_id");
    }

    #[test]
    fn rejects_invalid_event_id() {
        let err = parse_event_id("not-an-event-id").expect_err("invalid event id must fail");
        assert_eq!(err.code, "invalid_event_id");
    }

    #[test]
    fn rejects_invalid_user_id() {
        let err = parse_user_id("not-a-user").expect_err("invalid user id must fail");
        assert_eq!(err.code, "invalid_user_id");
    }

    #[test]
    fn derives_stable_per_account_data_dirs() {
        let config = MatrixClientConfig::new(
            "https://matrix.example.org",
            "/tmp/weft-store",
            None,
        );
        assert_eq!(
            config.data_dir_for_account("@alice:example.org"),
            Path::new("/tmp/weft-store/user-alice_example_org")
        );
        assert_ne!(
            config.data_dir_for_account("@alice:example.org"),
            config.data_dir_for_account("@bob:example.org")
        );
    }

    #[test]
    fn recoverable_sync_errors_are_network_and_rate_limit_only() {
        let network = EngineError::new(EngineErrorCategory::Network, "n", "network");
        let rate = EngineError::new(EngineErrorCategory::RateLimited, "r", "rate");
        let auth = EngineError::new(EngineErrorCategory::Auth, "a", "auth");

        assert!(is_recoverable_sync_error(&network));
        assert!(is_recoverable_sync_error(&rate));
        assert!(!is_recoverable_sync_error(&auth));
    }

    #[test]
    fn bounded_pagination_limit_rejects_nothing_above_one() {
        let options = messages_options(Some("tok"), 0, PaginationDirection::Backward)
            .expect("limit is clamped");
        assert_eq!(options.from.as_deref(), Some("tok"));
        assert_eq!(options.limit, UInt::new(1).unwrap());
    }

    #[test]
    fn live_buffer_trims_oldest_beyond_cap() {
        let live: LiveBuffers = Arc::new(StdMutex::new(HashMap::new()));
        for i in 0..(LIVE_BUFFER_CAP + 10) {
            buffer_live_event(
                &live,
                "!r:example.org",
                RawEvent::Json(serde_json::json!({"event_id": format!("${i}")})),
            );
        }
        let buffers = live.lock().unwrap();
        let buffer = buffers.get("!r:example.org").unwrap();
        assert_eq!(buffer.len(), LIVE_BUFFER_CAP);
        assert_eq!(buffer.front().unwrap().event_id(), Some("$10"));
    }
}
