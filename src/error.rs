//! Unified client error model.
//! Every call into the remote API settles with one of these kinds. Only `Auth`
//! participates in the renewal protocol; the others propagate untouched.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientError {
    /// No response was received (connect failure, timeout, reset).
    Network { code: String, message: String },
    /// Authorization failure, or the renewal call itself failed.
    Auth { code: String, message: String },
    /// The remote side rejected the request; `fields` carries per-field detail when present.
    Validation { code: String, message: String, #[serde(default)] fields: BTreeMap<String, Vec<String>> },
    /// Remote-side failure.
    Server { code: String, message: String, status: u16 },
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub fn code_str(&self) -> &str {
        match self {
            ClientError::Network { code, .. }
            | ClientError::Auth { code, .. }
            | ClientError::Validation { code, .. }
            | ClientError::Server { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ClientError::Network { message, .. }
            | ClientError::Auth { message, .. }
            | ClientError::Validation { message, .. }
            | ClientError::Server { message, .. } => message.as_str(),
        }
    }

    pub fn network<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { ClientError::Network { code: code.into(), message: msg.into() } }
    pub fn auth<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { ClientError::Auth { code: code.into(), message: msg.into() } }
    pub fn validation<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { ClientError::Validation { code: code.into(), message: msg.into(), fields: BTreeMap::new() } }
    pub fn server<C: Into<String>, M: Into<String>>(code: C, msg: M, status: u16) -> Self { ClientError::Server { code: code.into(), message: msg.into(), status } }

    pub fn is_auth(&self) -> bool { matches!(self, ClientError::Auth { .. }) }

    /// Network and server failures are worth an ephemeral notice; the rest are the caller's business.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Network { .. } | ClientError::Server { .. })
    }

    /// Build an error from a non-success HTTP status and its (possibly empty) JSON body.
    ///
    /// The body is inspected for `message`/`error` strings and for an `errors` object
    /// of field-level detail, accepting either `{field: "msg"}` or `{field: ["msg", ...]}`.
    pub fn from_status(status: u16, body: &serde_json::Value) -> Self {
        let message = body.get("message").and_then(|v| v.as_str())
            .or_else(|| body.get("error").and_then(|v| v.as_str()))
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("HTTP {}", status));
        let code = body.get("code").and_then(|v| v.as_str()).map(|s| s.to_string());
        match status {
            401 => ClientError::Auth { code: code.unwrap_or_else(|| "unauthorized".into()), message },
            403 => ClientError::Auth { code: code.unwrap_or_else(|| "forbidden".into()), message },
            400..=499 => ClientError::Validation {
                code: code.unwrap_or_else(|| "rejected".into()),
                message,
                fields: field_errors(body),
            },
            _ => ClientError::Server { code: code.unwrap_or_else(|| "server_error".into()), message, status },
        }
    }
}

fn field_errors(body: &serde_json::Value) -> BTreeMap<String, Vec<String>> {
    let mut out = BTreeMap::new();
    let Some(map) = body.get("errors").and_then(|v| v.as_object()) else { return out; };
    for (field, v) in map {
        let msgs: Vec<String> = match v {
            serde_json::Value::String(s) => vec![s.clone()],
            serde_json::Value::Array(arr) => arr.iter().filter_map(|m| m.as_str().map(|s| s.to_string())).collect(),
            other => vec![other.to_string()],
        };
        out.insert(field.clone(), msgs);
    }
    out
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ClientError::Network { code: "timeout".into(), message: err.to_string() };
        }
        if err.is_decode() {
            return ClientError::Server { code: "bad_payload".into(), message: err.to_string(), status: err.status().map(|s| s.as_u16()).unwrap_or(0) };
        }
        ClientError::Network { code: "network_error".into(), message: err.to_string() }
    }
}

impl From<anyhow::Error> for ClientError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: treat as Network unless downcasted elsewhere
        if let Some(e) = err.downcast_ref::<ClientError>() { return e.clone(); }
        ClientError::Network { code: "network_error".into(), message: err.to_string() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
