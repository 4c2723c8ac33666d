use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifyVia {
    Sms,
    Push,
    Both,
}

impl NotifyVia {
    pub fn includes_push(self) -> bool {
        matches!(self, NotifyVia::Push | NotifyVia::Both)
    }

    pub fn includes_sms(self) -> bool {
        matches!(self, NotifyVia::Sms | NotifyVia::Both)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Scheduled,
    Sent,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub notify_via: NotifyVia,
    pub remind_at: DateTime<Utc>,
    pub message: Option<String>,
    pub status: ReminderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ReminderStatus::Scheduled && self.remind_at <= now
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReminder {
    pub collection_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub notify_via: NotifyVia,
    pub remind_at: DateTime<Utc>,
    pub message: Option<String>,
}
