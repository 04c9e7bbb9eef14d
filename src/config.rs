//! Client configuration. Defaults suit a local development server; every field can be
//! overridden through `TRIPSYNC_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/api/";
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8080/realtime";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL in {var}: {source}")]
    Url { var: &'static str, #[source] source: url::ParseError },
    #[error("invalid number in {var}: '{value}'")]
    Number { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for REST calls; endpoint paths are joined onto it.
    pub api_url: Url,
    /// Real-time channel endpoint.
    pub ws_url: Url,
    /// Upper bound for the boot-time "who am I" call.
    pub restore_timeout: Duration,
    /// Per-request timeout applied by the HTTP transport.
    pub request_timeout: Duration,
    /// Where the access credential is persisted; `None` keeps it in memory only.
    pub credential_file: Option<PathBuf>,
    /// Transport-level reconnect attempts after a drop before the channel gives up.
    pub reconnect_max_attempts: u32,
    pub reconnect_base_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("static api url"),
            ws_url: Url::parse(DEFAULT_WS_URL).expect("static ws url"),
            restore_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            credential_file: default_credential_file(),
            reconnect_max_attempts: 5,
            reconnect_base_delay: Duration::from_millis(500),
        }
    }
}

fn default_credential_file() -> Option<PathBuf> {
    let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")).ok()?;
    Some(PathBuf::from(home).join(".tripsync").join("credential"))
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as `from_env` but reading through an arbitrary lookup, so tests need not touch the process env.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Some(v) = get("TRIPSYNC_API_URL") {
            cfg.api_url = parse_base_url("TRIPSYNC_API_URL", &v)?;
        }
        if let Some(v) = get("TRIPSYNC_WS_URL") {
            cfg.ws_url = Url::parse(&v).map_err(|source| ConfigError::Url { var: "TRIPSYNC_WS_URL", source })?;
        }
        if let Some(v) = get("TRIPSYNC_RESTORE_TIMEOUT_MS") {
            cfg.restore_timeout = Duration::from_millis(parse_num("TRIPSYNC_RESTORE_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = get("TRIPSYNC_REQUEST_TIMEOUT_MS") {
            cfg.request_timeout = Duration::from_millis(parse_num("TRIPSYNC_REQUEST_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = get("TRIPSYNC_CREDENTIAL_FILE") {
            // Empty value opts out of persistence
            cfg.credential_file = if v.trim().is_empty() { None } else { Some(PathBuf::from(v)) };
        }
        if let Some(v) = get("TRIPSYNC_RECONNECT_MAX") {
            cfg.reconnect_max_attempts = u32::try_from(parse_num("TRIPSYNC_RECONNECT_MAX", &v)?)
                .map_err(|_| ConfigError::Number { var: "TRIPSYNC_RECONNECT_MAX", value: v.clone() })?;
        }
        Ok(cfg)
    }
}

// Url::join drops the last path segment unless the base ends with '/'
fn parse_base_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let fixed = if raw.ends_with('/') { raw.to_string() } else { format!("{}/", raw) };
    Url::parse(&fixed).map_err(|source| ConfigError::Url { var, source })
}

fn parse_num(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|_| ConfigError::Number { var, value: raw.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn defaults_apply_without_env() {
        let cfg = ClientConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.restore_timeout, Duration::from_secs(5));
        assert_eq!(cfg.api_url.as_str(), DEFAULT_API_URL);
    }

    #[test]
    fn overrides_are_read() {
        let cfg = ClientConfig::from_lookup(lookup(&[
            ("TRIPSYNC_API_URL", "https://trips.example.com/api"),
            ("TRIPSYNC_RESTORE_TIMEOUT_MS", "250"),
            ("TRIPSYNC_CREDENTIAL_FILE", ""),
        ])).unwrap();
        assert_eq!(cfg.api_url.as_str(), "https://trips.example.com/api/");
        assert_eq!(cfg.api_url.join("auth/me").unwrap().as_str(), "https://trips.example.com/api/auth/me");
        assert_eq!(cfg.restore_timeout, Duration::from_millis(250));
        assert!(cfg.credential_file.is_none());
    }

    #[test]
    fn bad_number_is_reported() {
        let err = ClientConfig::from_lookup(lookup(&[("TRIPSYNC_RECONNECT_MAX", "lots")])).unwrap_err();
        assert!(err.to_string().contains("TRIPSYNC_RECONNECT_MAX"));
    }

    #[test]
    fn reconnect_max_out_of_range_is_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[("TRIPSYNC_RECONNECT_MAX", "4294967296")])).unwrap_err();
        assert!(matches!(err, ConfigError::Number { var: "TRIPSYNC_RECONNECT_MAX", .. }));
        let cfg = ClientConfig::from_lookup(lookup(&[("TRIPSYNC_RECONNECT_MAX", "4294967295")])).unwrap();
        assert_eq!(cfg.reconnect_max_attempts, u32::MAX);
    }
}
