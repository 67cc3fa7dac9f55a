//! Session validation and throttled client rebuild.

use std::sync::{
    Arc, Mutex as StdMutex,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use weft_core::{EngineError, RefreshThrottle, SessionStateMachine, ThrottleDecision};

use crate::{
    client::{ChatClient, ClientFactory, ClientSignal, ConnectionState},
    credentials::CredentialResolver,
    notice::EngineNotice,
    now_ms,
};

/// Hard budget for constructing and starting a new client.
const CLIENT_START_BUDGET: Duration = Duration::from_secs(5);
/// Overall budget covering start plus the first sync-ready signal.
const REFRESH_TOTAL_BUDGET: Duration = Duration::from_secs(15);

/// Validates the live client handle and drives re-authentication with bounded
/// retries, backoff, and a global cooldown.
///
/// Exactly one refresh may be in flight per process; concurrent callers await
/// the in-flight attempt. A duplicate concurrent re-registration would create
/// orphaned server-side identities, so this is the one critical section with
/// real mutual exclusion.
pub struct SessionRefresher {
    user_id: String,
    resolver: CredentialResolver,
    factory: Arc<dyn ClientFactory>,
    notices: broadcast::Sender<EngineNotice>,
    current: RwLock<Option<Arc<dyn ChatClient>>>,
    refresh_gate: Mutex<()>,
    generation: AtomicU64,
    throttle: StdMutex<RefreshThrottle>,
    lifecycle: StdMutex<SessionStateMachine>,
    listener_cancel: StdMutex<Option<CancellationToken>>,
}

impl SessionRefresher {
    pub fn new(
        user_id: impl Into<String>,
        resolver: CredentialResolver,
        factory: Arc<dyn ClientFactory>,
        notices: broadcast::Sender<EngineNotice>,
    ) -> Arc<Self> {
        Arc::new(Self {
            user_id: user_id.into(),
            resolver,
            factory,
            notices,
            current: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
            throttle: StdMutex::new(RefreshThrottle::default()),
            lifecycle: StdMutex::new(SessionStateMachine::default()),
            listener_cancel: StdMutex::new(None),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Replace the refresh throttle tuning.
    pub fn set_throttle(&self, throttle: RefreshThrottle) {
        *self
            .throttle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = throttle;
    }

    pub async fn current_client(&self) -> Option<Arc<dyn ChatClient>> {
        self.current.read().await.clone()
    }

    /// Return a client handle with a validated session, refreshing if needed.
    ///
    /// A missing handle or an unknown/errored connection state goes straight
    /// to refresh. A healthy-looking handle is probed with `whoami`; only a
    /// token-shaped failure triggers refresh, any other probe error is logged
    /// and the existing handle is returned unchanged.
    pub async fn ensure_valid(self: &Arc<Self>) -> Result<Arc<dyn ChatClient>, EngineError> {
        let client = match self.current_client().await {
            Some(client) => client,
            None => return self.refresh().await,
        };

        if matches!(
            client.connection_state(),
            ConnectionState::Unknown | ConnectionState::Error
        ) {
            debug!(user_id = %self.user_id, "client connection state unusable; refreshing");
            return self.refresh().await;
        }

        {
            let mut lifecycle = self.lifecycle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Err(err) = lifecycle.begin_validation() {
                debug!(error = %err, "validation not entered; another transition is active");
                return Ok(client);
            }
        }

        match client.whoami().await {
            Ok(_) => {
                let mut lifecycle = self.lifecycle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let _ = lifecycle.mark_valid();
                Ok(client)
            }
            Err(err) if err.is_token_invalid() => {
                info!(user_id = %self.user_id, "session token rejected; refreshing client");
                {
                    let mut lifecycle = self.lifecycle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    let _ = lifecycle.mark_invalid();
                }
                self.refresh().await
            }
            Err(err) => {
                // Fail open for non-auth probe errors.
                warn!(user_id = %self.user_id, error = %err, "session probe failed; keeping existing client");
                let mut lifecycle = self.lifecycle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let _ = lifecycle.mark_valid();
                Ok(client)
            }
        }
    }

    /// Rebuild the client from scratch.
    pub async fn refresh(self: &Arc<Self>) -> Result<Arc<dyn ChatClient>, EngineError> {
        let entered_generation = self.generation.load(Ordering::SeqCst);
        let _gate = self.refresh_gate.lock().await;

        if self.generation.load(Ordering::SeqCst) != entered_generation
            && let Some(client) = self.current_client().await
        {
            // The refresh we waited on already replaced the client.
            return Ok(client);
        }

        let now = now_ms();
        let decision = self.throttle.lock().unwrap_or_else(std::sync::PoisonError::into_inner).register(now);
        if let ThrottleDecision::Suspended { until_ms } = decision {
            let retry_after = Duration::from_millis(until_ms.saturating_sub(now));
            warn!(user_id = %self.user_id, retry_after_ms = retry_after.as_millis() as u64, "refresh suspended by cooldown");
            let _ = self.notices.send(EngineNotice::RefreshCooldown {
                retry_after_ms: retry_after.as_millis() as u64,
            });
            return Err(EngineError::refresh_exhausted(retry_after));
        }

        {
            let mut lifecycle = self.lifecycle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Err(err) = lifecycle.begin_refresh() {
                warn!(error = %err, "lifecycle did not accept refresh entry");
            }
        }

        self.discard_current().await;

        match self.rebuild().await {
            Ok(client) => {
                *self.current.write().await = Some(client.clone());
                self.generation.fetch_add(1, Ordering::SeqCst);
                {
                    let mut lifecycle = self.lifecycle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    let _ = lifecycle.finish_refresh(true);
                }
                self.install_listeners(&client);
                let _ = self.notices.send(EngineNotice::SessionReplaced {
                    user_id: self.user_id.clone(),
                });
                info!(user_id = %self.user_id, "session client rebuilt");
                Ok(client)
            }
            Err(err) => {
                let mut lifecycle = self.lifecycle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let _ = lifecycle.finish_refresh(false);
                warn!(user_id = %self.user_id, error = %err, "session refresh failed");
                Err(err)
            }
        }
    }

    /// Listener-driven refresh trigger.
    ///
    /// Multiple error listeners can fire for the same underlying fault;
    /// triggers inside the minimum spacing are dropped instead of becoming
    /// extra attempts.
    pub async fn refresh_from_signal(self: &Arc<Self>) {
        let now = now_ms();
        if self
            .throttle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .within_min_spacing(now)
        {
            debug!(user_id = %self.user_id, "refresh signal dropped inside minimum spacing");
            return;
        }

        if let Err(err) = self.refresh().await {
            warn!(user_id = %self.user_id, error = %err, "signal-driven refresh failed");
        }
    }

    /// Stop the current client and cancel its listeners.
    pub async fn teardown(&self) {
        self.discard_current().await;
    }

    async fn discard_current(&self) {
        if let Some(cancel) = self
            .listener_cancel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            cancel.cancel();
        }
        if let Some(old) = self.current.write().await.take() {
            old.stop().await;
        }
    }

    async fn rebuild(&self) -> Result<Arc<dyn ChatClient>, EngineError> {
        let credentials = match self.resolver.resolve(&self.user_id).await {
            Ok(credentials) => credentials,
            Err(err) if err.code == "no_credentials_found" => {
                info!(user_id = %self.user_id, "no stored credentials; registering derived account");
                let (username, password) = derived_registration(&self.user_id);
                let credentials = self.factory.register(&username, &password).await?;
                self.resolver.persist(&credentials);
                credentials
            }
            Err(err) => return Err(err),
        };

        let deadline = tokio::time::Instant::now() + REFRESH_TOTAL_BUDGET;
        let client = tokio::time::timeout(CLIENT_START_BUDGET, self.factory.build(&credentials))
            .await
            .map_err(|_| {
                EngineError::new(
                    weft_core::EngineErrorCategory::Network,
                    "client_start_timeout",
                    "new client did not start within budget",
                )
            })??;

        self.await_first_sync(client.as_ref(), deadline).await;

        // Prefer the client's own session material: a password login rotates
        // the token. The stored password survives the supersession.
        let mut persisted = client
            .session_credentials()
            .unwrap_or_else(|| credentials.clone());
        if persisted.password.is_none() {
            persisted.password = credentials.password.clone();
        }
        self.resolver.persist(&persisted);
        Ok(client)
    }

    /// Wait for the first sync-ready signal inside the remaining budget.
    /// Timeout is treated as "proceed anyway": availability over consistency.
    async fn await_first_sync(&self, client: &dyn ChatClient, deadline: tokio::time::Instant) {
        if client.connection_state() == ConnectionState::Ready {
            return;
        }

        let mut signals = client.subscribe();
        let wait = async {
            loop {
                match signals.recv().await {
                    Ok(ClientSignal::SyncReady)
                    | Ok(ClientSignal::ConnectionStateChanged(ConnectionState::Ready)) => break,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        if tokio::time::timeout_at(deadline, wait).await.is_err() {
            warn!(user_id = %self.user_id, "first sync-ready signal not observed within budget; proceeding");
        }
    }

    /// Route connection-state and logout signals through the throttled
    /// refresh path. All such signals coalesce onto one refresh attempt.
    fn install_listeners(self: &Arc<Self>, client: &Arc<dyn ChatClient>) {
        let cancel = CancellationToken::new();
        *self.listener_cancel.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(cancel.clone());

        let mut signals = client.subscribe();
        let refresher = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    signal = signals.recv() => match signal {
                        Ok(ClientSignal::LoggedOut) => {
                            info!(user_id = %refresher.user_id, "server logged the session out");
                            refresher.refresh_from_signal().await;
                        }
                        Ok(ClientSignal::ConnectionStateChanged(ConnectionState::Error)) => {
                            refresher.refresh_from_signal().await;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }
}

/// Deterministic per-user registration material for silent account creation.
pub fn derived_registration(user_id: &str) -> (String, String) {
    let localpart = user_id
        .strip_prefix('@')
        .unwrap_or(user_id)
        .split(':')
        .next()
        .unwrap_or(user_id);
    let slug: String = localpart
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let username = format!("{slug}_weft");
    let password = Uuid::new_v5(&Uuid::NAMESPACE_OID, user_id.as_bytes())
        .simple()
        .to_string();
    (username, password)
}
