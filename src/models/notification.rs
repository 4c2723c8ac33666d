use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Assignment,
    Overdue,
    #[default]
    Generic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Unread,
    Read,
    Snoozed,
    Done,
}

impl NotificationStatus {
    pub fn is_unread(self) -> bool {
        matches!(self, NotificationStatus::Unread | NotificationStatus::Snoozed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    #[default]
    Admin,
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub status: NotificationStatus,
    pub actor_role: ActorRole,
    pub meta: serde_json::Value,
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewNotification {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub kind: NotificationKind,
    #[serde(default)]
    pub actor_role: ActorRole,
    #[serde(default)]
    pub meta: serde_json::Value,
    pub due_at: Option<DateTime<Utc>>,
}

impl NewNotification {
    /// Agent addressed through `meta.target_agent_id`, if any.
    pub fn target_agent_id(&self) -> Option<Uuid> {
        self.meta
            .get("target_agent_id")
            .and_then(|value| value.as_str())
            .and_then(|raw| raw.parse().ok())
    }
}

/// A push registration for a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceToken {
    pub token: String,
    pub agent_id: Option<Uuid>,
    pub platform: String,
    pub last_seen_at: DateTime<Utc>,
}
