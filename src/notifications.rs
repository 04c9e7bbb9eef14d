//! Notification log: newest-first, capped at `NOTIFICATION_CAPACITY`, with an unread counter.
//!
//! `NotificationState` is a plain value with pure transitions (`reduce`); the store wraps it
//! in a lock so the channel and UI can share one log.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub const NOTIFICATION_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Trip,
    Itinerary,
    Collaboration,
    Resource,
    Payment,
    Quota,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationAction {
    Append(Notification),
    MarkRead(String),
    MarkAllRead,
    Clear,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationState {
    items: VecDeque<Notification>,
    unread: usize,
}

impl NotificationState {
    pub fn new() -> Self { Self::default() }

    pub fn items(&self) -> impl Iterator<Item = &Notification> { self.items.iter() }
    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn unread_count(&self) -> usize { self.unread }

    pub fn reduce(self, action: NotificationAction) -> Self {
        match action {
            NotificationAction::Append(n) => self.append(n),
            NotificationAction::MarkRead(id) => self.mark_read(&id),
            NotificationAction::MarkAllRead => self.mark_all_read(),
            NotificationAction::Clear => self.clear(),
        }
    }

    pub fn append(mut self, n: Notification) -> Self {
        self.items.push_front(n);
        self.items.truncate(NOTIFICATION_CAPACITY);
        self.unread += 1;
        self
    }

    /// The counter moves even if the entry was already read or is missing; it never drops below 0.
    pub fn mark_read(mut self, id: &str) -> Self {
        if let Some(n) = self.items.iter_mut().find(|n| n.id == id) {
            n.read = true;
        }
        self.unread = self.unread.saturating_sub(1);
        self
    }

    pub fn mark_all_read(mut self) -> Self {
        for n in self.items.iter_mut() {
            n.read = true;
        }
        self.unread = 0;
        self
    }

    pub fn clear(mut self) -> Self {
        self.items.clear();
        self.unread = 0;
        self
    }
}

/// Shared, lock-protected log. Observers watch a revision counter that bumps on every change.
pub struct NotificationStore {
    state: RwLock<NotificationState>,
    revision: watch::Sender<u64>,
}

impl Default for NotificationStore {
    fn default() -> Self { Self::new() }
}

impl NotificationStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self { state: RwLock::new(NotificationState::new()), revision }
    }

    pub fn dispatch(&self, action: NotificationAction) {
        {
            let mut st = self.state.write();
            let cur = std::mem::take(&mut *st);
            *st = cur.reduce(action);
        }
        self.revision.send_modify(|r| *r += 1);
    }

    pub fn append(&self, n: Notification) { self.dispatch(NotificationAction::Append(n)) }
    pub fn mark_read(&self, id: &str) { self.dispatch(NotificationAction::MarkRead(id.to_string())) }
    pub fn mark_all_read(&self) { self.dispatch(NotificationAction::MarkAllRead) }
    pub fn clear(&self) { self.dispatch(NotificationAction::Clear) }

    pub fn snapshot(&self) -> NotificationState { self.state.read().clone() }
    pub fn unread_count(&self) -> usize { self.state.read().unread_count() }
    pub fn len(&self) -> usize { self.state.read().len() }
    pub fn is_empty(&self) -> bool { self.state.read().is_empty() }

    pub fn watch(&self) -> watch::Receiver<u64> { self.revision.subscribe() }
}
