//! Wire frames for the real-time channel and the inbound event table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::notifications::{Notification, NotificationKind, Priority};

/// One message on the channel, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self { Self { event: event.into(), data } }
}

/// Inbound event name -> notification kind, with the title used when the payload has none.
/// Names missing here are ignored.
pub static EVENT_KINDS: &[(&str, NotificationKind, &str)] = &[
    ("trip:created", NotificationKind::Trip, "Trip created"),
    ("trip:updated", NotificationKind::Trip, "Trip updated"),
    ("itinerary:generated", NotificationKind::Itinerary, "Itinerary ready"),
    ("itinerary:updated", NotificationKind::Itinerary, "Itinerary updated"),
    ("collaborator:joined", NotificationKind::Collaboration, "New collaborator"),
    ("resource:updated", NotificationKind::Resource, "Resource updated"),
    ("payment:succeeded", NotificationKind::Payment, "Payment received"),
    ("payment:failed", NotificationKind::Payment, "Payment failed"),
    ("quota:low", NotificationKind::Quota, "Quota running low"),
    ("system:announcement", NotificationKind::System, "Announcement"),
];

pub const JOIN_ROOM: &str = "join-room";
pub const LEAVE_ROOM: &str = "leave-room";
pub const PUBLISH_UPDATE: &str = "publish-update";

pub fn kind_for(event: &str) -> Option<NotificationKind> {
    EVENT_KINDS.iter().find(|(name, _, _)| *name == event).map(|(_, kind, _)| *kind)
}

fn default_title(event: &str) -> &'static str {
    EVENT_KINDS.iter().find(|(name, _, _)| *name == event).map(|(_, _, t)| *t).unwrap_or("")
}

fn str_field<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn priority_of(data: &Value) -> Option<Priority> {
    match str_field(data, "priority")?.to_ascii_lowercase().as_str() {
        "high" | "urgent" => Some(Priority::High),
        "normal" | "medium" => Some(Priority::Normal),
        "low" => Some(Priority::Low),
        _ => None,
    }
}

/// Map an inbound frame to a notification, or `None` for events outside the table.
pub fn to_notification(frame: &Frame) -> Option<Notification> {
    let kind = kind_for(&frame.event)?;
    let data = &frame.data;
    let timestamp = str_field(data, "timestamp")
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    Some(Notification {
        id: str_field(data, "id").map(|s| s.to_string()).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        timestamp,
        kind,
        title: str_field(data, "title").unwrap_or(default_title(&frame.event)).to_string(),
        message: str_field(data, "message").unwrap_or_default().to_string(),
        read: false,
        priority: priority_of(data),
    })
}

pub fn join_room(room: &str) -> Frame { Frame::new(JOIN_ROOM, json!({"room": room})) }
pub fn leave_room(room: &str) -> Frame { Frame::new(LEAVE_ROOM, json!({"room": room})) }
pub fn publish_update(payload: Value) -> Frame { Frame::new(PUBLISH_UPDATE, payload) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lookups() {
        assert_eq!(kind_for("resource:updated"), Some(NotificationKind::Resource));
        assert_eq!(kind_for("payment:succeeded"), Some(NotificationKind::Payment));
        assert_eq!(kind_for("typing:start"), None);
    }

    #[test]
    fn every_table_entry_maps() {
        for (name, kind, title) in EVENT_KINDS {
            let n = to_notification(&Frame::new(*name, Value::Null)).unwrap();
            assert_eq!(n.kind, *kind);
            assert_eq!(n.title, *title);
            assert!(!n.read);
        }
    }

    #[test]
    fn payload_fields_win() {
        let f = Frame::new("itinerary:generated", json!({
            "id": "evt-7",
            "title": "Your Kyoto plan is ready",
            "message": "5 days, 14 stops",
            "priority": "HIGH",
            "timestamp": "2026-03-01T10:00:00Z"
        }));
        let n = to_notification(&f).unwrap();
        assert_eq!(n.id, "evt-7");
        assert_eq!(n.title, "Your Kyoto plan is ready");
        assert_eq!(n.priority, Some(Priority::High));
        assert_eq!(n.timestamp.to_rfc3339(), "2026-03-01T10:00:00+00:00");
    }

    #[test]
    fn unknown_event_ignored() {
        assert!(to_notification(&Frame::new("presence:ping", json!({"title": "x"}))).is_none());
    }

    #[test]
    fn outbound_frames() {
        assert_eq!(serde_json::to_value(join_room("trip-1")).unwrap(), json!({"event": "join-room", "data": {"room": "trip-1"}}));
        assert_eq!(leave_room("trip-1").event, LEAVE_ROOM);
        assert_eq!(publish_update(json!({"k": 1})).data, json!({"k": 1}));
    }
}
