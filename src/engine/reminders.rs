use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::notify;
use crate::error::AppError;
use crate::models::notification::{ActorRole, NewNotification, NotificationKind};
use crate::models::reminder::{NewReminder, Reminder, ReminderStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ReminderRunReport {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
}

pub fn create_reminder(state: &AppState, new: NewReminder) -> Result<Reminder, AppError> {
    let collection = state
        .store
        .collection(new.collection_id)
        .ok_or_else(|| AppError::collection_not_found(new.collection_id))?;

    if let Some(agent_id) = new.agent_id {
        if !state.store.agent_exists(agent_id) {
            return Err(AppError::agent_not_found(agent_id));
        }
    }

    let now = Utc::now();
    let reminder = Reminder {
        id: Uuid::new_v4(),
        collection_id: collection.id,
        customer_id: new.customer_id.or(collection.customer_id),
        agent_id: new.agent_id,
        notify_via: new.notify_via,
        remind_at: new.remind_at,
        message: new.message,
        status: ReminderStatus::Scheduled,
        created_at: now,
        updated_at: now,
    };
    state.store.reminders.insert(reminder.id, reminder.clone());

    info!(
        reminder_id = %reminder.id,
        collection_id = %reminder.collection_id,
        remind_at = %reminder.remind_at,
        "reminder scheduled"
    );
    Ok(reminder)
}

/// Reminders for a collection, earliest first.
pub fn list_for_collection(state: &AppState, collection_id: Uuid) -> Vec<Reminder> {
    let mut reminders: Vec<Reminder> = state
        .store
        .reminders
        .iter()
        .filter(|entry| entry.value().collection_id == collection_id)
        .map(|entry| entry.value().clone())
        .collect();
    reminders.sort_by_key(|reminder| reminder.remind_at);
    reminders
}

pub fn cancel_reminder(state: &AppState, id: Uuid) -> Result<Reminder, AppError> {
    let mut reminder = state
        .store
        .reminders
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("reminder {id} not found")))?;

    if reminder.status != ReminderStatus::Scheduled {
        return Err(AppError::Conflict(format!(
            "reminder {id} is already {:?}",
            reminder.status
        )));
    }
    reminder.status = ReminderStatus::Cancelled;
    reminder.updated_at = Utc::now();

    info!(reminder_id = %id, "reminder cancelled");
    Ok(reminder.clone())
}

/// Processes up to `reminder_batch_size` due reminders. A reminder that fails
/// stays scheduled and is retried on the next run.
pub async fn process_due_reminders(state: &AppState, now: DateTime<Utc>) -> ReminderRunReport {
    let mut due: Vec<Reminder> = state
        .store
        .reminders
        .iter()
        .filter(|entry| entry.value().is_due(now))
        .map(|entry| entry.value().clone())
        .collect();
    due.sort_by_key(|reminder| reminder.remind_at);
    due.truncate(state.config.reminder_batch_size);

    let mut report = ReminderRunReport {
        due: due.len(),
        ..ReminderRunReport::default()
    };

    for reminder in due {
        match deliver(state, &reminder).await {
            Ok(()) => {
                report.sent += 1;
                state
                    .metrics
                    .reminders_processed_total
                    .with_label_values(&["sent"])
                    .inc();
            }
            Err(err) => {
                report.failed += 1;
                state
                    .metrics
                    .reminders_processed_total
                    .with_label_values(&["failed"])
                    .inc();
                warn!(reminder_id = %reminder.id, error = %err, "reminder left scheduled for retry");
            }
        }
    }

    if report.due > 0 {
        info!(due = report.due, sent = report.sent, failed = report.failed, "reminder run finished");
    }
    report
}

async fn deliver(state: &AppState, reminder: &Reminder) -> Result<(), AppError> {
    let message = reminder
        .message
        .clone()
        .unwrap_or_else(|| "You have a scheduled collection.".to_string());

    let notification = notify::store_notification(
        state,
        NewNotification {
            title: "Reminder".to_string(),
            body: message,
            kind: NotificationKind::Generic,
            actor_role: if reminder.agent_id.is_some() {
                ActorRole::Agent
            } else {
                ActorRole::Admin
            },
            meta: json!({
                "collection_id": reminder.collection_id,
                "reminder_id": reminder.id,
                "target_agent_id": reminder.agent_id,
            }),
            due_at: Some(reminder.remind_at),
        },
    )?;

    if reminder.notify_via.includes_push() {
        if let Some(agent_id) = reminder.agent_id {
            let mut data = HashMap::new();
            data.insert("type".to_string(), "reminder".to_string());
            data.insert("reminder_id".to_string(), reminder.id.to_string());
            data.insert("collection_id".to_string(), reminder.collection_id.to_string());
            notify::push_to_agents(state, &[agent_id], &notification, data).await?;
        }
    }
    if reminder.notify_via.includes_sms() {
        info!(
            reminder_id = %reminder.id,
            customer_id = ?reminder.customer_id,
            "sms reminder recorded; no sms transport configured"
        );
    }

    if let Some(mut stored) = state.store.reminders.get_mut(&reminder.id) {
        // A cancel that landed while the push was in flight wins.
        if stored.status == ReminderStatus::Scheduled {
            stored.status = ReminderStatus::Sent;
            stored.updated_at = Utc::now();
        }
    }
    Ok(())
}

pub async fn run_reminder_scheduler(state: Arc<AppState>) {
    let period = Duration::from_secs(state.config.reminder_interval_secs.max(1));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = period.as_secs(), "reminder scheduler started");

    loop {
        ticker.tick().await;
        let report = process_due_reminders(&state, Utc::now()).await;
        if report.failed > 0 {
            error!(failed = report.failed, "reminder run had failures");
        }
    }
}
