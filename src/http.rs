//! HTTP transport seam. The dispatcher only ever sees `ApiRequest`/`ApiResponse`;
//! `ReqwestTransport` is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Relative to the configured API base, e.g. `trips/42`.
    pub path: String,
    pub body: Option<Value>,
    /// Set after the one permitted post-renewal retry.
    pub retried: bool,
    /// Auth endpoints answer 401 for bad credentials; those must not start a renewal.
    pub allow_renewal: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, retried: false, allow_renewal: true }
    }
    pub fn get(path: impl Into<String>) -> Self { Self::new(Method::Get, path) }
    pub fn post(path: impl Into<String>) -> Self { Self::new(Method::Post, path) }
    pub fn put(path: impl Into<String>) -> Self { Self::new(Method::Put, path) }
    pub fn patch(path: impl Into<String>) -> Self { Self::new(Method::Patch, path) }
    pub fn delete(path: impl Into<String>) -> Self { Self::new(Method::Delete, path) }

    pub fn json(mut self, body: Value) -> Self { self.body = Some(body); self }
    pub fn without_renewal(mut self) -> Self { self.allow_renewal = false; self }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }
    pub fn is_unauthorized(&self) -> bool { self.status == 401 }

    /// Success passes through; anything else becomes the matching `ClientError`.
    pub fn into_result(self) -> ClientResult<ApiResponse> {
        if self.is_success() { Ok(self) } else { Err(ClientError::from_status(self.status, &self.body)) }
    }
}

/// Performs one round trip. Returns `Err` only when no response was received;
/// every HTTP status, 401 included, comes back as `Ok(ApiResponse)`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, req: &ApiRequest, bearer: Option<&str>) -> ClientResult<ApiResponse>;
}

pub struct ReqwestTransport {
    base: Url,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(base: Url, timeout: Duration) -> ClientResult<Self> {
        // Cookie store carries the server-held refresh state the renewal endpoint relies on
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { base, client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, req: &ApiRequest, bearer: Option<&str>) -> ClientResult<ApiResponse> {
        let url = self.base.join(req.path.trim_start_matches('/'))
            .map_err(|e| ClientError::validation("bad_path", &format!("{}: {}", req.path, e)))?;
        let method = match req.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut headers = HeaderMap::new();
        if let Some(tok) = bearer {
            let hv = HeaderValue::from_str(&format!("Bearer {}", tok))
                .map_err(|_| ClientError::auth("bad_credential", "credential is not a valid header value"))?;
            headers.insert(AUTHORIZATION, hv);
        }
        let mut rb = self.client.request(method, url).headers(headers);
        if let Some(body) = &req.body {
            rb = rb.json(body);
        }
        let resp = rb.send().await?;
        let status = resp.status().as_u16();
        // Empty or non-JSON bodies are legal (204, plain-text errors)
        let bytes = resp.bytes().await?;
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        debug!(target: "http", "{:?} {} -> {}", req.method, req.path, status);
        Ok(ApiResponse { status, body })
    }
}
