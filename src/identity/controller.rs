use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::{ApiClient, AuthGrant};
use crate::credential::CredentialStore;
use crate::error::{ClientError, ClientResult};
use crate::notice::NoticeBoard;

use super::authorizer::{has_permission, UnknownCapabilityPolicy};
use super::principal::{Principal, PrincipalUpdate, Quota};
use super::session::{Session, SessionEvent, SessionState, SessionStatus};

/// Result of an interactive login/registration. Failures never escape as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    Failed { message: String },
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool { matches!(self, AuthOutcome::Success) }
}

/// Owns the session lifecycle: boot restore, login, registration, logout and profile updates.
pub struct SessionController {
    api: ApiClient,
    credentials: Arc<CredentialStore>,
    state: Arc<SessionState>,
    notices: NoticeBoard,
    restore_timeout: Duration,
    unknown_capability: UnknownCapabilityPolicy,
    restore_started: AtomicBool,
}

impl SessionController {
    pub fn new(api: ApiClient, state: Arc<SessionState>, notices: NoticeBoard, restore_timeout: Duration) -> Self {
        let credentials = api.dispatcher().credentials().clone();
        Self {
            api,
            credentials,
            state,
            notices,
            restore_timeout,
            unknown_capability: UnknownCapabilityPolicy::default(),
            restore_started: AtomicBool::new(false),
        }
    }

    pub fn with_unknown_capability_policy(mut self, policy: UnknownCapabilityPolicy) -> Self {
        self.unknown_capability = policy;
        self
    }

    pub fn state(&self) -> &Arc<SessionState> { &self.state }
    pub fn session(&self) -> Session { self.state.snapshot() }

    /// Boot-time restore. Runs at most once; later calls just report the current status.
    pub async fn restore(&self) -> SessionStatus {
        if self.restore_started.swap(true, Ordering::SeqCst) {
            return self.state.status();
        }
        if self.credentials.restore_persisted().is_none() {
            debug!(target: "session", "no persisted credential; starting signed out");
            self.state.unauthenticate(None);
            return SessionStatus::Unauthenticated;
        }
        self.state.begin_restoring();
        match tokio::time::timeout(self.restore_timeout, self.api.me()).await {
            Ok(Ok(principal)) => {
                self.state.authenticate(principal, SessionEvent::Restored);
            }
            Ok(Err(e)) => {
                warn!(target: "session", "session restore failed: {}", e);
                self.credentials.clear();
                self.state.unauthenticate(None);
            }
            Err(_) => {
                warn!(target: "session", "session restore timed out after {:?}", self.restore_timeout);
                self.credentials.clear();
                self.state.unauthenticate(None);
            }
        }
        self.state.status()
    }

    pub async fn login(&self, identifier: &str, secret: &str) -> AuthOutcome {
        self.state.begin_loading();
        let res = self.api.login(identifier, secret).await;
        self.finish_auth(res, SessionEvent::LoggedIn)
    }

    pub async fn register(&self, name: &str, identifier: &str, secret: &str) -> AuthOutcome {
        self.state.begin_loading();
        let res = self.api.register(name, identifier, secret).await;
        self.finish_auth(res, SessionEvent::Registered)
    }

    fn finish_auth(&self, res: ClientResult<AuthGrant>, ev: SessionEvent) -> AuthOutcome {
        match res {
            Ok(grant) => {
                self.credentials.set(&grant.token);
                self.state.authenticate(grant.principal, ev);
                AuthOutcome::Success
            }
            Err(e) => {
                let message = failure_message(&e);
                info!(target: "session", "authentication failed: {}", e);
                self.credentials.clear();
                self.state.unauthenticate(Some(SessionEvent::LoginFailed { message: message.clone() }));
                self.notices.error(message.clone());
                AuthOutcome::Failed { message }
            }
        }
    }

    /// Best-effort remote invalidation, then an unconditional local sign-out.
    pub async fn logout(&self) {
        if self.credentials.token().is_some() {
            match tokio::time::timeout(self.restore_timeout, self.api.logout()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(target: "session", "remote logout ignored: {}", e),
                Err(_) => debug!(target: "session", "remote logout timed out; ignored"),
            }
        }
        self.credentials.clear();
        self.state.unauthenticate(Some(SessionEvent::LoggedOut));
    }

    /// Merge profile fields into the current principal; authentication state is untouched.
    pub fn update_principal(&self, update: PrincipalUpdate) -> bool {
        self.state.update_principal(update)
    }

    /// Re-read the principal from the server, e.g. after a plan change.
    pub async fn refresh_principal(&self) -> ClientResult<Principal> {
        let p = self.api.me().await?;
        if !self.state.replace_principal(p.clone()) {
            return Err(ClientError::auth("not_authenticated", "session ended while refreshing the profile"));
        }
        Ok(p)
    }

    pub fn has_permission(&self, capability: &str) -> bool {
        match self.state.principal() {
            Some(p) => has_permission(&p, capability, self.unknown_capability),
            None => false,
        }
    }

    /// `Quota::Unlimited` stands for the reserved "no limit" value.
    pub fn remaining_quota(&self) -> Option<Quota> {
        self.state.principal().map(|p| p.quota_remaining)
    }
}

fn failure_message(e: &ClientError) -> String {
    match e {
        ClientError::Auth { .. } => {
            if e.message().starts_with("HTTP ") { "Invalid email or password".to_string() } else { e.message().to_string() }
        }
        ClientError::Network { .. } => "Unable to reach the server. Check your connection and try again.".to_string(),
        _ => e.message().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_messages() {
        assert_eq!(failure_message(&ClientError::from_status(401, &serde_json::Value::Null)), "Invalid email or password");
        assert_eq!(failure_message(&ClientError::auth("locked", "Account locked")), "Account locked");
        assert!(failure_message(&ClientError::network("network_error", "reset")).starts_with("Unable to reach"));
    }
}
