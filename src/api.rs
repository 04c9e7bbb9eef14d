//! Typed wrappers over the auth endpoints, plus a generic JSON call for everything else.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::dispatch::{extract_token, Dispatcher};
use crate::error::{ClientError, ClientResult};
use crate::http::ApiRequest;
use crate::identity::Principal;

pub const LOGIN_PATH: &str = "auth/login";
pub const REGISTER_PATH: &str = "auth/register";
pub const ME_PATH: &str = "auth/me";
pub const LOGOUT_PATH: &str = "auth/logout";

/// Credential and principal returned by login/registration.
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub token: String,
    pub principal: Principal,
}

#[derive(Clone)]
pub struct ApiClient {
    dispatcher: Arc<Dispatcher>,
}

impl ApiClient {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self { Self { dispatcher } }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> { &self.dispatcher }

    pub async fn login(&self, identifier: &str, secret: &str) -> ClientResult<AuthGrant> {
        let req = ApiRequest::post(LOGIN_PATH)
            .json(json!({"email": identifier, "password": secret}))
            .without_renewal();
        let resp = self.dispatcher.dispatch(req).await?;
        parse_grant(&resp.body)
    }

    pub async fn register(&self, name: &str, identifier: &str, secret: &str) -> ClientResult<AuthGrant> {
        let req = ApiRequest::post(REGISTER_PATH)
            .json(json!({"name": name, "email": identifier, "password": secret}))
            .without_renewal();
        let resp = self.dispatcher.dispatch(req).await?;
        parse_grant(&resp.body)
    }

    /// "Who am I" for the current credential.
    pub async fn me(&self) -> ClientResult<Principal> {
        let resp = self.dispatcher.dispatch(ApiRequest::get(ME_PATH)).await?;
        parse_principal(&resp.body)
    }

    pub async fn logout(&self) -> ClientResult<()> {
        self.dispatcher.dispatch(ApiRequest::post(LOGOUT_PATH).without_renewal()).await?;
        Ok(())
    }

    /// Any business endpoint; the payload stays opaque.
    pub async fn call(&self, req: ApiRequest) -> ClientResult<Value> {
        Ok(self.dispatcher.dispatch(req).await?.body)
    }
}

fn parse_grant(body: &Value) -> ClientResult<AuthGrant> {
    let token = extract_token(body)
        .ok_or_else(|| ClientError::server("bad_payload", "auth response carried no credential", 200))?;
    let principal = parse_principal(body)?;
    Ok(AuthGrant { token, principal })
}

// `{user: {...}}` or the bare principal object
fn parse_principal(body: &Value) -> ClientResult<Principal> {
    let raw = body.get("user").unwrap_or(body);
    serde_json::from_value(raw.clone())
        .map_err(|e| ClientError::server("bad_payload", format!("invalid principal: {}", e), 200))
}
