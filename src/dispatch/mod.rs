//! Request dispatcher: attaches the bearer credential, classifies responses, and runs the
//! 401 -> renew -> retry protocol through the `RenewalCoordinator`.

pub mod renewal;

use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::credential::CredentialStore;
use crate::error::{ClientError, ClientResult};
use crate::http::{ApiRequest, ApiResponse, HttpTransport};
use crate::identity::SessionState;
use crate::notice::NoticeBoard;

pub use renewal::{Admission, PendingCall, RenewalCoordinator};

pub const RENEW_PATH: &str = "auth/refresh";

pub struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<CredentialStore>,
    session: Arc<SessionState>,
    notices: NoticeBoard,
    renewal: RenewalCoordinator,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<CredentialStore>,
        session: Arc<SessionState>,
        notices: NoticeBoard,
    ) -> Self {
        Self { transport, credentials, session, notices, renewal: RenewalCoordinator::new() }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> { &self.credentials }
    pub fn renewal(&self) -> &RenewalCoordinator { &self.renewal }

    /// Issue `req` with the current credential. A 401 on a first attempt is recovered
    /// through a (shared) renewal and a single retry; anything else settles as-is.
    pub async fn dispatch(&self, req: ApiRequest) -> ClientResult<ApiResponse> {
        let sent_with = self.credentials.token();
        let resp = self.send(&req, sent_with.as_deref()).await?;
        if !resp.is_unauthorized() || req.retried || !req.allow_renewal {
            return self.settle(resp);
        }
        self.recover(req, resp, sent_with).await
    }

    async fn recover(&self, req: ApiRequest, rejected: ApiResponse, sent_with: Option<String>) -> ClientResult<ApiResponse> {
        let (current, epoch) = self.credentials.snapshot();
        match self.renewal.admit(req, sent_with.as_deref(), current.as_deref()) {
            Admission::SignedOut => {
                debug!(target: "renewal", "authorization failed with no credential held; not renewing");
                self.settle(rejected)
            }
            Admission::Queued(rx) => rx.await.unwrap_or_else(|_| {
                Err(ClientError::network("renewal_abandoned", "credential renewal was cancelled"))
            }),
            Admission::AlreadyRenewed { request } => {
                debug!(target: "renewal", "{} failed with a superseded credential; retrying", request.path);
                self.retry(request, current).await
            }
            Admission::Leader { guard, request } => {
                info!(target: "renewal", "credential rejected on {}; renewing", request.path);
                match self.renew().await {
                    Ok(token) => {
                        // A logout/login during the renewal owns the store now; waiters still get the new token
                        if !self.credentials.replace_if_epoch(epoch, &token) {
                            info!(target: "renewal", "session changed during renewal; renewed credential not stored");
                        }
                        let pending = guard.settle();
                        debug!(target: "renewal", "renewal succeeded; replaying {} queued call(s)", pending.len());
                        let replay = join_all(pending.into_iter().map(|p| {
                            let tok = token.clone();
                            async move {
                                let res = self.retry(p.request.clone(), Some(tok)).await;
                                p.settle(res);
                            }
                        }));
                        let (_, own) = tokio::join!(replay, self.retry(request, Some(token.clone())));
                        own
                    }
                    Err(err) => {
                        warn!(target: "renewal", "renewal failed: {}", err);
                        if self.credentials.epoch() == epoch {
                            self.credentials.clear();
                            self.session.force_logout(err.message());
                        }
                        let pending = guard.settle();
                        for p in pending {
                            p.settle(Err(err.clone()));
                        }
                        Err(err)
                    }
                }
            }
        }
    }

    /// The one renewal network call. Every failure, whatever its cause, is an auth failure.
    async fn renew(&self) -> ClientResult<String> {
        let req = ApiRequest::post(RENEW_PATH).without_renewal();
        let resp = self.transport.send(&req, None).await
            .map_err(|e| ClientError::auth("renewal_failed", e.message()))?;
        if !resp.is_success() {
            let inner = ClientError::from_status(resp.status, &resp.body);
            return Err(ClientError::auth("renewal_failed", inner.message()));
        }
        extract_token(&resp.body).ok_or_else(|| ClientError::auth("renewal_failed", "renewal response carried no credential"))
    }

    async fn retry(&self, mut req: ApiRequest, bearer: Option<String>) -> ClientResult<ApiResponse> {
        req.retried = true;
        let resp = self.send(&req, bearer.as_deref()).await?;
        self.settle(resp)
    }

    async fn send(&self, req: &ApiRequest, bearer: Option<&str>) -> ClientResult<ApiResponse> {
        self.transport.send(req, bearer).await.map_err(|e| self.surface(e))
    }

    fn settle(&self, resp: ApiResponse) -> ClientResult<ApiResponse> {
        resp.into_result().map_err(|e| self.surface(e))
    }

    fn surface(&self, e: ClientError) -> ClientError {
        if e.is_transient() {
            self.notices.error(e.message().to_string());
        }
        e
    }
}

/// Accepts `{token}`, `{accessToken}` or `{access_token}`.
pub fn extract_token(body: &Value) -> Option<String> {
    ["token", "accessToken", "access_token"].iter()
        .find_map(|k| body.get(*k).and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
