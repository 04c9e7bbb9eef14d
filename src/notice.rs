//! Ephemeral user-facing notices: transient failures, high-priority alerts, login messages.
//! Fire-and-forget; nobody listening is fine.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
    /// Immediate attention, raised by high-priority channel events.
    Alert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Clone)]
pub struct NoticeBoard {
    tx: broadcast::Sender<Notice>,
}

impl Default for NoticeBoard {
    fn default() -> Self { Self::new() }
}

impl NoticeBoard {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> { self.tx.subscribe() }

    pub fn post(&self, level: NoticeLevel, text: impl Into<String>) {
        let _ = self.tx.send(Notice { level, text: text.into() });
    }

    pub fn error(&self, text: impl Into<String>) { self.post(NoticeLevel::Error, text) }
    pub fn alert(&self, text: impl Into<String>) { self.post(NoticeLevel::Alert, text) }
}
