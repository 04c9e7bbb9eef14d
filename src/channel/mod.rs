//! Real-time channel manager.
//!
//! Keeps at most one connection alive, and only while the session is authenticated.
//! Every teardown bumps a generation counter; a connect that finishes under an old
//! generation is discarded, so a slow handshake can never resurrect a closed channel.

pub mod events;
pub mod transport;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::credential::CredentialStore;
use crate::error::{ClientError, ClientResult};
use crate::identity::{SessionState, SessionStatus};
use crate::notice::NoticeBoard;
use crate::notifications::{NotificationStore, Priority};

use events::Frame;
pub use transport::{ChannelConnector, ChannelLink, WsConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Disconnected,
    Connecting,
    Connected,
}

struct Inner {
    status: ChannelStatus,
    generation: u64,
    /// Credential the live (or pending) connection was opened with.
    token: Option<String>,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    reader: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
}

pub struct ChannelManager {
    connector: Arc<dyn ChannelConnector>,
    credentials: Arc<CredentialStore>,
    session: Arc<SessionState>,
    notifications: Arc<NotificationStore>,
    notices: NoticeBoard,
    inner: Mutex<Inner>,
    transitions: broadcast::Sender<ChannelStatus>,
}

impl ChannelManager {
    pub fn new(
        connector: Arc<dyn ChannelConnector>,
        credentials: Arc<CredentialStore>,
        session: Arc<SessionState>,
        notifications: Arc<NotificationStore>,
        notices: NoticeBoard,
    ) -> Arc<Self> {
        let (transitions, _) = broadcast::channel(64);
        Arc::new(Self {
            connector,
            credentials,
            session,
            notifications,
            notices,
            inner: Mutex::new(Inner {
                status: ChannelStatus::Disconnected,
                generation: 0,
                token: None,
                outbound: None,
                reader: None,
                pump: None,
            }),
            transitions,
        })
    }

    pub fn status(&self) -> ChannelStatus { self.inner.lock().status }

    /// Every status change, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelStatus> { self.transitions.subscribe() }

    fn set_status(&self, inner: &mut Inner, next: ChannelStatus) {
        if inner.status == next { return; }
        debug!(target: "channel", "{:?} -> {:?}", inner.status, next);
        inner.status = next;
        let _ = self.transitions.send(next);
    }

    /// Connect with the current credential. No-op while connecting/connected or while the
    /// session is not authenticated.
    pub async fn open(self: &Arc<Self>) -> ClientResult<()> {
        let (gen, token) = {
            let mut inner = self.inner.lock();
            if inner.status != ChannelStatus::Disconnected {
                return Ok(());
            }
            if self.session.status() != SessionStatus::Authenticated {
                debug!(target: "channel", "not opening: session is {:?}", self.session.status());
                return Ok(());
            }
            let Some(token) = self.credentials.token() else {
                return Err(ClientError::auth("no_credential", "no credential to open the channel with"));
            };
            inner.generation += 1;
            inner.token = Some(token.clone());
            self.set_status(&mut inner, ChannelStatus::Connecting);
            (inner.generation, token)
        };

        let res = self.connector.connect(&token).await;

        let mut inner = self.inner.lock();
        if inner.generation != gen {
            // Torn down while the handshake was in flight
            if let Ok(link) = res {
                if let Some(p) = link.pump { p.abort(); }
            }
            debug!(target: "channel", "discarding connection from superseded generation {}", gen);
            return Ok(());
        }
        match res {
            Ok(link) => {
                let ChannelLink { outbound, inbound, pump } = link;
                inner.outbound = Some(outbound);
                inner.pump = pump;
                inner.reader = Some(tokio::spawn(read_loop(Arc::downgrade(self), gen, inbound)));
                self.set_status(&mut inner, ChannelStatus::Connected);
                info!(target: "channel", "channel open");
                Ok(())
            }
            Err(e) => {
                warn!(target: "channel", "channel connect failed: {}", e);
                inner.token = None;
                self.set_status(&mut inner, ChannelStatus::Disconnected);
                Err(e)
            }
        }
    }

    /// Tear down whatever exists, including a connect still in flight.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.token = None;
        inner.outbound = None;
        if let Some(h) = inner.reader.take() { h.abort(); }
        if let Some(h) = inner.pump.take() { h.abort(); }
        if inner.status != ChannelStatus::Disconnected {
            info!(target: "channel", "channel closed");
        }
        self.set_status(&mut inner, ChannelStatus::Disconnected);
    }

    /// Bring the channel in line with the session status.
    pub async fn sync(self: &Arc<Self>, status: SessionStatus) {
        if status != SessionStatus::Authenticated {
            self.close();
            return;
        }
        let stale = {
            let inner = self.inner.lock();
            inner.status != ChannelStatus::Disconnected && inner.token != self.credentials.token()
        };
        // Re-login (possibly coalesced with a logout) handed out a different credential
        if stale {
            self.close();
        }
        if let Err(e) = self.open().await {
            debug!(target: "channel", "open skipped: {}", e);
        }
    }

    /// Follow session status changes until the session state goes away.
    pub fn follow(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.session.watch_status();
        let me = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let status = *rx.borrow_and_update();
                let Some(m) = me.upgrade() else { return; };
                if status == SessionStatus::Authenticated {
                    // Connect off the watch loop so a slow handshake never delays a teardown
                    tokio::spawn(async move { m.sync(status).await });
                } else {
                    m.close();
                }
                if rx.changed().await.is_err() { return; }
            }
        })
    }

    fn emit(&self, frame: Frame) -> bool {
        let inner = self.inner.lock();
        if inner.status != ChannelStatus::Connected {
            return false;
        }
        inner.outbound.as_ref().map(|tx| tx.send(frame).is_ok()).unwrap_or(false)
    }

    /// Fire-and-forget; `false` when the channel is not connected.
    pub fn join_room(&self, room: &str) -> bool { self.emit(events::join_room(room)) }
    pub fn leave_room(&self, room: &str) -> bool { self.emit(events::leave_room(room)) }
    pub fn publish_update(&self, payload: Value) -> bool { self.emit(events::publish_update(payload)) }

    fn handle_frame(&self, frame: Frame) {
        let Some(n) = events::to_notification(&frame) else {
            debug!(target: "channel", "ignoring event '{}'", frame.event);
            return;
        };
        if n.priority == Some(Priority::High) {
            let text = if n.message.is_empty() { n.title.clone() } else { format!("{}: {}", n.title, n.message) };
            self.notices.alert(text);
        }
        self.notifications.append(n);
    }

    /// Inbound side closed: the transport gave up reconnecting.
    fn link_ended(&self, gen: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != gen { return; }
        warn!(target: "channel", "channel lost");
        inner.generation += 1;
        inner.token = None;
        inner.outbound = None;
        inner.reader = None;
        if let Some(h) = inner.pump.take() { h.abort(); }
        self.set_status(&mut inner, ChannelStatus::Disconnected);
    }
}

async fn read_loop(mgr: Weak<ChannelManager>, gen: u64, mut inbound: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = inbound.recv().await {
        let Some(m) = mgr.upgrade() else { return; };
        m.handle_frame(frame);
    }
    if let Some(m) = mgr.upgrade() {
        m.link_ended(gen);
    }
}
