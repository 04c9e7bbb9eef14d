//! Channel transport seam and the WebSocket implementation.
//!
//! A connector hands back a `ChannelLink`: an outbound sender and an inbound receiver.
//! The WebSocket pump behind the link reconnects on its own after a drop, reusing the
//! credential it was opened with; when it gives up the inbound side closes.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue as WsHeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use super::events::Frame;

pub struct ChannelLink {
    pub outbound: mpsc::UnboundedSender<Frame>,
    pub inbound: mpsc::UnboundedReceiver<Frame>,
    /// Background task driving the connection, aborted on teardown.
    pub pump: Option<JoinHandle<()>>,
}

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Open one authenticated connection using `token`.
    async fn connect(&self, token: &str) -> ClientResult<ChannelLink>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsConnector {
    url: Url,
    max_attempts: u32,
    base_delay: Duration,
}

impl WsConnector {
    pub fn new(url: Url, max_attempts: u32, base_delay: Duration) -> Self {
        Self { url, max_attempts, base_delay }
    }

    fn endpoint(&self, token: &str) -> Url {
        let mut u = self.url.clone();
        u.query_pairs_mut().append_pair("token", token);
        u
    }
}

async fn open_socket(url: &Url, token: &str) -> ClientResult<WsStream> {
    let mut req = url.as_str().into_client_request()
        .map_err(|e| ClientError::network("ws_request", e.to_string()))?;
    let auth = WsHeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| ClientError::auth("bad_credential", "credential is not a valid header value"))?;
    req.headers_mut().insert("authorization", auth);
    let (stream, _resp) = tokio_tungstenite::connect_async(req).await
        .map_err(|e| ClientError::network("ws_connect", e.to_string()))?;
    Ok(stream)
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn connect(&self, token: &str) -> ClientResult<ChannelLink> {
        let url = self.endpoint(token);
        let stream = open_socket(&url, token).await?;
        info!(target: "channel", "connected to {}", self.url);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let retry = Reconnect { url, token: token.to_string(), max_attempts: self.max_attempts, base_delay: self.base_delay };
        let pump = tokio::spawn(pump(stream, retry, out_rx, in_tx));
        Ok(ChannelLink { outbound: out_tx, inbound: in_rx, pump: Some(pump) })
    }
}

struct Reconnect {
    url: Url,
    token: String,
    max_attempts: u32,
    base_delay: Duration,
}

impl Reconnect {
    /// Exponential backoff, capped at 30s between attempts.
    async fn attempt(&self) -> Option<WsStream> {
        for n in 0..self.max_attempts {
            let delay = self.base_delay.saturating_mul(1u32 << n.min(6)).min(Duration::from_secs(30));
            tokio::time::sleep(delay).await;
            match open_socket(&self.url, &self.token).await {
                Ok(s) => {
                    info!(target: "channel", "reconnected after {} attempt(s)", n + 1);
                    return Some(s);
                }
                Err(e) => debug!(target: "channel", "reconnect attempt {} failed: {}", n + 1, e),
            }
        }
        warn!(target: "channel", "giving up after {} reconnect attempts", self.max_attempts);
        None
    }
}

async fn pump(
    mut ws: WsStream,
    retry: Reconnect,
    mut out_rx: mpsc::UnboundedReceiver<Frame>,
    in_tx: mpsc::UnboundedSender<Frame>,
) {
    loop {
        tokio::select! {
            out = out_rx.recv() => {
                let Some(frame) = out else {
                    // Manager dropped the link
                    let _ = ws.close(None).await;
                    return;
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(t) => t,
                    Err(e) => { warn!(target: "channel", "cannot encode {}: {}", frame.event, e); continue; }
                };
                // No ack tracking: a frame lost with the connection stays lost
                if let Err(e) = ws.send(Message::Text(text)).await {
                    debug!(target: "channel", "send failed: {}", e);
                    match retry.attempt().await { Some(s) => ws = s, None => return }
                }
            }
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(t))) => match serde_json::from_str::<Frame>(&t) {
                    Ok(frame) => { if in_tx.send(frame).is_err() { return; } }
                    Err(e) => debug!(target: "channel", "dropping malformed frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    warn!(target: "channel", "connection dropped");
                    match retry.attempt().await { Some(s) => ws = s, None => return }
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_carries_token() {
        let c = WsConnector::new(Url::parse("wss://trips.example.com/realtime").unwrap(), 3, Duration::from_millis(10));
        let u = c.endpoint("a b+c");
        assert_eq!(u.as_str(), "wss://trips.example.com/realtime?token=a+b%2Bc");
    }
}
