//! Long-lived session context owning the current client handle.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use weft_core::EngineError;

use crate::{
    cache::MessageCache,
    client::{ChatClient, ClientFactory, ClientSignal},
    credentials::CredentialResolver,
    members::MemberCache,
    notice::EngineNotice,
    reconcile::MessageEngine,
    refresh::SessionRefresher,
};

const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// Tuning for one session context.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user_id: String,
    /// Serve cached messages before hitting the network.
    pub cache_first: bool,
}

/// Owns the process's current client handle with explicit init/teardown.
///
/// Components receive this context by injection; nothing reads a client from
/// ambient global state.
pub struct SessionContext {
    refresher: Arc<SessionRefresher>,
    messages: Arc<MessageEngine>,
    notice_tx: broadcast::Sender<EngineNotice>,
    watcher_cancel: StdMutex<Option<CancellationToken>>,
}

impl SessionContext {
    pub fn new(
        config: SessionConfig,
        resolver: CredentialResolver,
        factory: Arc<dyn ClientFactory>,
        cache: Arc<dyn MessageCache>,
    ) -> Arc<Self> {
        let (notice_tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let refresher = SessionRefresher::new(
            config.user_id.clone(),
            resolver,
            factory,
            notice_tx.clone(),
        );
        let members = Arc::new(MemberCache::default());
        let messages = Arc::new(MessageEngine::new(
            Arc::clone(&refresher),
            cache,
            members,
            config.cache_first,
        ));

        Arc::new(Self {
            refresher,
            messages,
            notice_tx,
            watcher_cancel: StdMutex::new(None),
        })
    }

    /// Acquire a validated client and start room-signal watching.
    pub async fn init(self: &Arc<Self>) -> Result<Arc<dyn ChatClient>, EngineError> {
        let client = self.refresher.ensure_valid().await?;
        self.spawn_room_signal_watcher();
        info!(user_id = self.refresher.user_id(), "session context initialized");
        Ok(client)
    }

    /// Stop the client, cancel watchers, and drop per-room caches.
    pub async fn teardown(&self) {
        if let Some(cancel) = self.watcher_cancel.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take() {
            cancel.cancel();
        }
        self.refresher.teardown().await;
        self.messages.clear().await;
        info!(user_id = self.refresher.user_id(), "session context torn down");
    }

    pub fn messages(&self) -> &Arc<MessageEngine> {
        &self.messages
    }

    pub fn refresher(&self) -> &Arc<SessionRefresher> {
        &self.refresher
    }

    /// Subscribe to user-visible session notices.
    pub fn notices(&self) -> broadcast::Receiver<EngineNotice> {
        self.notice_tx.subscribe()
    }

    /// Watch membership/room-state signals and force-refresh the affected
    /// room's member cache. Re-attaches whenever the session is replaced.
    fn spawn_room_signal_watcher(self: &Arc<Self>) {
        let mut watcher = self.watcher_cancel.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if watcher.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        *watcher = Some(cancel.clone());
        drop(watcher);

        enum Next {
            Stop,
            Reattach,
            WaitForSession,
        }

        let ctx = Arc::clone(self);
        let mut notices = self.notice_tx.subscribe();
        tokio::spawn(async move {
            loop {
                let Some(client) = ctx.refresher.current_client().await else {
                    match notices.recv().await {
                        Ok(_) => continue,
                        Err(_) => break,
                    }
                };

                let mut signals = client.subscribe();
                let next = loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break Next::Stop,
                        notice = notices.recv() => match notice {
                            Ok(EngineNotice::SessionReplaced { .. }) => break Next::Reattach,
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(_)) => {}
                            Err(broadcast::error::RecvError::Closed) => break Next::Stop,
                        },
                        signal = signals.recv() => match signal {
                            Ok(ClientSignal::MembershipChanged { room_id })
                            | Ok(ClientSignal::RoomStateChanged { room_id }) => {
                                ctx.handle_membership_change(&room_id).await;
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(_)) => {}
                            Err(broadcast::error::RecvError::Closed) => break Next::WaitForSession,
                        },
                    }
                };

                match next {
                    Next::Stop => break,
                    Next::Reattach => continue,
                    // The old client went away without a replacement notice
                    // yet; park until the session layer reports one.
                    Next::WaitForSession => match notices.recv().await {
                        Ok(_) => continue,
                        Err(_) => break,
                    },
                }
            }
        });
    }

    async fn handle_membership_change(&self, room_id: &str) {
        self.messages.members().invalidate(room_id).await;
        if let Some(client) = self.refresher.current_client().await
            && let Some(room) = client.get_room(room_id)
        {
            if let Err(err) = self.messages.members().load(&room, true).await {
                debug!(room_id, error = %err, "forced member refresh failed");
            }
        }
    }
}
