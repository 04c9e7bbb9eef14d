use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::info;

use crate::tprintln;
use super::principal::{Principal, PrincipalUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Restoring,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub principal: Option<Principal>,
    pub status: SessionStatus,
    pub loading: bool,
}

impl Session {
    pub fn authenticated(&self) -> bool { self.status == SessionStatus::Authenticated }
}

/// Lifecycle events broadcast to observers (UI redirects, logging).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    Registered,
    Restored,
    LoginFailed { message: String },
    LoggedOut,
    /// Credential renewal failed; observers should return to the signed-out landing state.
    ForcedLogout { reason: String },
    PrincipalUpdated,
}

/// Shared session state. The controller drives it; the dispatcher may only force a logout;
/// the channel manager only watches the status.
pub struct SessionState {
    inner: RwLock<Session>,
    status_tx: watch::Sender<SessionStatus>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for SessionState {
    fn default() -> Self { Self::new() }
}

impl SessionState {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Idle);
        let (events, _) = broadcast::channel(64);
        Self {
            inner: RwLock::new(Session { principal: None, status: SessionStatus::Idle, loading: false }),
            status_tx,
            events,
        }
    }

    pub fn snapshot(&self) -> Session { self.inner.read().clone() }
    pub fn status(&self) -> SessionStatus { self.inner.read().status }
    pub fn principal(&self) -> Option<Principal> { self.inner.read().principal.clone() }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> { self.status_tx.subscribe() }
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.events.subscribe() }

    fn set_status(&self, s: &mut Session, next: SessionStatus) {
        if s.status != next {
            tprintln!("session.transition {:?} -> {:?}", s.status, next);
            s.status = next;
            self.status_tx.send_replace(next);
        }
    }

    fn emit(&self, ev: SessionEvent) {
        let _ = self.events.send(ev);
    }

    pub(crate) fn begin_restoring(&self) {
        let mut s = self.inner.write();
        s.loading = true;
        self.set_status(&mut s, SessionStatus::Restoring);
    }

    /// Login/registration in progress. Status is left alone.
    pub(crate) fn begin_loading(&self) {
        self.inner.write().loading = true;
    }

    /// Watchers are notified even when already authenticated: a fresh login may carry a
    /// new credential that anything holding the old one must pick up.
    pub(crate) fn authenticate(&self, principal: Principal, ev: SessionEvent) {
        {
            let mut s = self.inner.write();
            info!(target: "session", "authenticated as {} ({:?})", principal.id, ev);
            s.principal = Some(principal);
            s.loading = false;
            if s.status == SessionStatus::Authenticated {
                self.status_tx.send_replace(SessionStatus::Authenticated);
            } else {
                self.set_status(&mut s, SessionStatus::Authenticated);
            }
        }
        self.emit(ev);
    }

    pub(crate) fn unauthenticate(&self, ev: Option<SessionEvent>) {
        {
            let mut s = self.inner.write();
            s.principal = None;
            s.loading = false;
            self.set_status(&mut s, SessionStatus::Unauthenticated);
        }
        if let Some(ev) = ev { self.emit(ev); }
    }

    /// Renewal failed. Transitions (and emits `ForcedLogout`) only if not already signed out,
    /// so any number of failing callers produce one transition.
    pub(crate) fn force_logout(&self, reason: &str) -> bool {
        {
            let mut s = self.inner.write();
            if s.status == SessionStatus::Unauthenticated {
                return false;
            }
            info!(target: "session", "forced logout: {}", reason);
            s.principal = None;
            s.loading = false;
            self.set_status(&mut s, SessionStatus::Unauthenticated);
        }
        self.emit(SessionEvent::ForcedLogout { reason: reason.to_string() });
        true
    }

    pub(crate) fn update_principal(&self, upd: PrincipalUpdate) -> bool {
        {
            let mut s = self.inner.write();
            let Some(p) = s.principal.as_mut() else { return false; };
            p.merge(upd);
        }
        self.emit(SessionEvent::PrincipalUpdated);
        true
    }

    pub(crate) fn replace_principal(&self, principal: Principal) -> bool {
        {
            let mut s = self.inner.write();
            if s.status != SessionStatus::Authenticated { return false; }
            s.principal = Some(principal);
        }
        self.emit(SessionEvent::PrincipalUpdated);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_logout_fires_once() {
        let st = SessionState::new();
        let mut rx = st.subscribe();
        st.authenticate(Principal { id: "u".into(), ..Default::default() }, SessionEvent::LoggedIn);
        assert!(st.force_logout("refresh rejected"));
        assert!(!st.force_logout("refresh rejected"));
        assert_eq!(st.status(), SessionStatus::Unauthenticated);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::LoggedIn);
        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::ForcedLogout { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn watch_sees_latest_status() {
        let st = SessionState::new();
        let rx = st.watch_status();
        st.begin_restoring();
        assert!(st.snapshot().loading);
        st.unauthenticate(None);
        assert_eq!(*rx.borrow(), SessionStatus::Unauthenticated);
        assert!(!st.snapshot().loading);
    }

    #[test]
    fn reauthentication_wakes_watchers() {
        let st = SessionState::new();
        let mut rx = st.watch_status();
        st.authenticate(Principal { id: "u-1".into(), ..Default::default() }, SessionEvent::LoggedIn);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        st.authenticate(Principal { id: "u-2".into(), ..Default::default() }, SessionEvent::LoggedIn);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SessionStatus::Authenticated);
    }

    #[test]
    fn update_without_principal_is_ignored() {
        let st = SessionState::new();
        assert!(!st.update_principal(PrincipalUpdate { name: Some("x".into()), ..Default::default() }));
    }
}
