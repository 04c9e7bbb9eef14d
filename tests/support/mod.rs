//! Scripted in-memory backend and channel connector shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use tripsync::channel::events::Frame;
use tripsync::channel::{ChannelConnector, ChannelLink};
use tripsync::credential::CredentialPersistence;
use tripsync::http::{ApiRequest, ApiResponse, HttpTransport};
use tripsync::{ClientConfig, ClientError, ClientResult, TripClient};

pub const PASSWORD: &str = "secret";

/// Fake API. Exactly one token is valid at a time; `expire()` invalidates it and a
/// successful refresh mints the next one (`tok-2`, `tok-3`, ...).
pub struct MockBackend {
    valid: Mutex<Option<String>>,
    minted: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub refresh_ok: AtomicBool,
    pub logout_fails: AtomicBool,
    pub refresh_delay: Mutex<Duration>,
    pub me_delay: Mutex<Duration>,
    /// (path, bearer) of every business call that succeeded.
    pub served: Mutex<Vec<(String, String)>>,
    /// Business paths answering with a fixed status/body regardless of credential.
    pub fixed: Mutex<HashMap<String, (u16, Value)>>,
    /// Business paths whose transport fails outright.
    pub unreachable: Mutex<Vec<String>>,
    /// Business paths that answer only after a delay.
    pub slow: Mutex<HashMap<String, Duration>>,
    /// Credential the next successful login/registration hands out instead of the current one.
    pub next_login_token: Mutex<Option<String>>,
    pub user: Mutex<Value>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            valid: Mutex::new(Some("tok-1".into())),
            minted: AtomicUsize::new(1),
            refresh_calls: AtomicUsize::new(0),
            me_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            refresh_ok: AtomicBool::new(true),
            logout_fails: AtomicBool::new(false),
            refresh_delay: Mutex::new(Duration::from_millis(20)),
            me_delay: Mutex::new(Duration::ZERO),
            served: Mutex::new(Vec::new()),
            fixed: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(Vec::new()),
            slow: Mutex::new(HashMap::new()),
            next_login_token: Mutex::new(None),
            user: Mutex::new(json!({
                "id": "u-1", "name": "Ada", "email": "a@b.com", "role": "user",
                "planTier": "explorer", "quotaRemaining": 12
            })),
        }
    }
}

impl MockBackend {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    /// The current server-side credential stops being accepted.
    pub fn expire(&self) { *self.valid.lock() = None; }

    pub fn valid_token(&self) -> Option<String> { self.valid.lock().clone() }

    pub fn refreshes(&self) -> usize { self.refresh_calls.load(Ordering::SeqCst) }

    fn authorized(&self, bearer: Option<&str>) -> bool {
        let v = self.valid.lock();
        matches!((v.as_deref(), bearer), (Some(a), Some(b)) if a == b)
    }

    fn unauthorized() -> ApiResponse { ApiResponse { status: 401, body: json!({"message": "token expired"}) } }
}

#[async_trait]
impl HttpTransport for MockBackend {
    async fn send(&self, req: &ApiRequest, bearer: Option<&str>) -> ClientResult<ApiResponse> {
        match req.path.as_str() {
            "auth/login" | "auth/register" => {
                let body = req.body.clone().unwrap_or(Value::Null);
                if body.get("password").and_then(|v| v.as_str()) != Some(PASSWORD) {
                    return Ok(ApiResponse { status: 401, body: json!({"message": "Invalid email or password"}) });
                }
                let tok = match self.next_login_token.lock().take() {
                    Some(t) => {
                        *self.valid.lock() = Some(t.clone());
                        t
                    }
                    None => self.valid.lock().get_or_insert_with(|| "tok-1".into()).clone(),
                };
                Ok(ApiResponse { status: 200, body: json!({"token": tok, "user": self.user.lock().clone()}) })
            }
            "auth/refresh" => {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                let delay = *self.refresh_delay.lock();
                tokio::time::sleep(delay).await;
                if !self.refresh_ok.load(Ordering::SeqCst) {
                    return Ok(ApiResponse { status: 401, body: json!({"message": "refresh session expired"}) });
                }
                let n = self.minted.fetch_add(1, Ordering::SeqCst) + 1;
                let tok = format!("tok-{}", n);
                *self.valid.lock() = Some(tok.clone());
                Ok(ApiResponse { status: 200, body: json!({"accessToken": tok}) })
            }
            "auth/me" => {
                self.me_calls.fetch_add(1, Ordering::SeqCst);
                let delay = *self.me_delay.lock();
                if !delay.is_zero() { tokio::time::sleep(delay).await; }
                if !self.authorized(bearer) { return Ok(Self::unauthorized()); }
                Ok(ApiResponse { status: 200, body: json!({"user": self.user.lock().clone()}) })
            }
            "auth/logout" => {
                self.logout_calls.fetch_add(1, Ordering::SeqCst);
                if self.logout_fails.load(Ordering::SeqCst) {
                    return Ok(ApiResponse { status: 500, body: json!({"message": "boom"}) });
                }
                Ok(ApiResponse { status: 204, body: Value::Null })
            }
            path => {
                let delay = self.slow.lock().get(path).copied();
                if let Some(d) = delay { tokio::time::sleep(d).await; }
                if self.unreachable.lock().iter().any(|p| p == path) {
                    return Err(ClientError::network("network_error", "connection refused"));
                }
                if let Some((status, body)) = self.fixed.lock().get(path).cloned() {
                    return Ok(ApiResponse { status, body });
                }
                if !self.authorized(bearer) { return Ok(Self::unauthorized()); }
                let tok = bearer.unwrap_or_default().to_string();
                self.served.lock().push((path.to_string(), tok));
                Ok(ApiResponse { status: 200, body: json!({"ok": true, "path": path}) })
            }
        }
    }
}

/// Server half of an in-memory channel connection.
pub struct ServerEnd {
    /// Credential the client connected with.
    pub token: String,
    pub to_client: mpsc::UnboundedSender<Frame>,
    pub from_client: mpsc::UnboundedReceiver<Frame>,
}

#[derive(Default)]
pub struct MemoryConnector {
    pub connects: AtomicUsize,
    pub tokens: Mutex<Vec<String>>,
    pub delay: Mutex<Duration>,
    pub fail: AtomicBool,
    pub servers: Mutex<Vec<ServerEnd>>,
}

impl MemoryConnector {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn connect_count(&self) -> usize { self.connects.load(Ordering::SeqCst) }

    /// Server end of the most recent connection.
    pub fn take_last(&self) -> Option<ServerEnd> { self.servers.lock().pop() }

    /// Server end of the connection opened with `token`.
    pub fn take_for(&self, token: &str) -> Option<ServerEnd> {
        let mut servers = self.servers.lock();
        let at = servers.iter().position(|s| s.token == token)?;
        Some(servers.remove(at))
    }
}

#[async_trait]
impl ChannelConnector for MemoryConnector {
    async fn connect(&self, token: &str) -> ClientResult<ChannelLink> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().push(token.to_string());
        let delay = *self.delay.lock();
        if !delay.is_zero() { tokio::time::sleep(delay).await; }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::network("ws_connect", "refused"));
        }
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        self.servers.lock().push(ServerEnd { token: token.to_string(), to_client, from_client });
        Ok(ChannelLink { outbound, inbound, pump: None })
    }
}

/// Persistence that tests can inspect after handing it to the client.
#[derive(Default, Clone)]
pub struct SharedPersistence(pub Arc<Mutex<Option<String>>>);

impl SharedPersistence {
    pub fn with_token(tok: &str) -> Self { Self(Arc::new(Mutex::new(Some(tok.to_string())))) }
    pub fn get(&self) -> Option<String> { self.0.lock().clone() }
}

impl CredentialPersistence for SharedPersistence {
    fn load(&self) -> Option<String> { self.0.lock().clone() }
    fn save(&self, token: &str) { *self.0.lock() = Some(token.to_string()); }
    fn clear(&self) { *self.0.lock() = None; }
}

pub struct Harness {
    pub client: Arc<TripClient>,
    pub backend: Arc<MockBackend>,
    pub connector: Arc<MemoryConnector>,
    pub persisted: SharedPersistence,
}

pub fn harness_with(config: ClientConfig, persisted: SharedPersistence) -> Harness {
    let backend = MockBackend::new();
    let connector = MemoryConnector::new();
    let client = TripClient::with_parts(&config, backend.clone(), connector.clone(), Box::new(persisted.clone()));
    Harness { client: Arc::new(client), backend, connector, persisted }
}

pub fn harness() -> Harness {
    harness_with(ClientConfig::default(), SharedPersistence::default())
}

/// Boot with nothing persisted and sign in with the good password.
pub async fn signed_in() -> Harness {
    let h = harness();
    h.client.boot().await;
    let out = h.client.session().login("a@b.com", PASSWORD).await;
    assert!(out.is_success(), "login failed: {:?}", out);
    h
}

/// Poll `cond` until it holds, failing the test after two seconds.
pub async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..400 {
        if cond() { return; }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}
