//! Client facade: builds every component from a `ClientConfig` and wires them together.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::api::ApiClient;
use crate::channel::{ChannelConnector, ChannelManager, WsConnector};
use crate::config::ClientConfig;
use crate::credential::{CredentialPersistence, CredentialStore, FilePersistence, MemoryPersistence};
use crate::dispatch::Dispatcher;
use crate::error::ClientResult;
use crate::http::{HttpTransport, ReqwestTransport};
use crate::identity::{SessionController, SessionState, SessionStatus};
use crate::notice::NoticeBoard;
use crate::notifications::NotificationStore;

pub struct TripClient {
    api: ApiClient,
    session: SessionController,
    channel: Arc<ChannelManager>,
    notifications: Arc<NotificationStore>,
    notices: NoticeBoard,
    follower: Mutex<Option<JoinHandle<()>>>,
}

impl TripClient {
    /// Production wiring: reqwest for calls, WebSocket for the channel.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let http = Arc::new(ReqwestTransport::new(config.api_url.clone(), config.request_timeout)?);
        let ws = Arc::new(WsConnector::new(config.ws_url.clone(), config.reconnect_max_attempts, config.reconnect_base_delay));
        let persistence: Box<dyn CredentialPersistence> = match &config.credential_file {
            Some(p) => Box::new(FilePersistence::new(p)),
            None => Box::new(MemoryPersistence::default()),
        };
        Ok(Self::with_parts(config, http, ws, persistence))
    }

    /// Wiring with caller-supplied transports and persistence.
    pub fn with_parts(
        config: &ClientConfig,
        http: Arc<dyn HttpTransport>,
        connector: Arc<dyn ChannelConnector>,
        persistence: Box<dyn CredentialPersistence>,
    ) -> Self {
        let notices = NoticeBoard::new();
        let credentials = Arc::new(CredentialStore::new(persistence));
        let state = Arc::new(SessionState::new());
        let notifications = Arc::new(NotificationStore::new());
        let dispatcher = Arc::new(Dispatcher::new(http, credentials.clone(), state.clone(), notices.clone()));
        let api = ApiClient::new(dispatcher);
        let session = SessionController::new(api.clone(), state.clone(), notices.clone(), config.restore_timeout);
        let channel = ChannelManager::new(connector, credentials, state, notifications.clone(), notices.clone());
        Self { api, session, channel, notifications, notices, follower: Mutex::new(None) }
    }

    /// Start following the session with the channel, then restore any persisted session.
    /// Must run inside a Tokio runtime.
    pub async fn boot(&self) -> SessionStatus {
        {
            let mut f = self.follower.lock();
            if f.is_none() {
                *f = Some(self.channel.follow());
            }
        }
        let status = self.session.restore().await;
        info!(target: "session", "boot finished: {:?}", status);
        status
    }

    pub fn api(&self) -> &ApiClient { &self.api }
    pub fn session(&self) -> &SessionController { &self.session }
    pub fn channel(&self) -> &Arc<ChannelManager> { &self.channel }
    pub fn notifications(&self) -> &Arc<NotificationStore> { &self.notifications }
    pub fn notices(&self) -> &NoticeBoard { &self.notices }
    pub fn state(&self) -> &Arc<SessionState> { self.session.state() }
}

impl Drop for TripClient {
    fn drop(&mut self) {
        if let Some(h) = self.follower.lock().take() { h.abort(); }
        self.channel.close();
    }
}
