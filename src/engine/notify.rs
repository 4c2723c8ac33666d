use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::notification::{
    ActorRole, DeviceToken, NewNotification, Notification, NotificationStatus,
};
use crate::push::{send_chunked, PushNotification, PushSummary};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterToken {
    pub token: String,
    pub platform: String,
    pub agent_id: Option<Uuid>,
}

/// Stores a notification and, when it targets an agent, pushes it to that
/// agent's devices. Push failures are logged and never fail the create.
pub async fn create_notification(
    state: &AppState,
    new: NewNotification,
) -> Result<Notification, AppError> {
    let target = new.target_agent_id();
    let notification = store_notification(state, new)?;

    if let Some(agent_id) = target {
        let mut data = HashMap::new();
        data.insert("notification_id".to_string(), notification.id.to_string());
        if let Err(err) = push_to_agents(state, &[agent_id], &notification, data).await {
            warn!(
                notification_id = %notification.id,
                agent_id = %agent_id,
                error = %err,
                "notification push failed"
            );
        }
    }

    Ok(notification)
}

/// Validates and persists a notification without any delivery.
pub(crate) fn store_notification(
    state: &AppState,
    new: NewNotification,
) -> Result<Notification, AppError> {
    if new.title.trim().is_empty() || new.body.trim().is_empty() {
        return Err(AppError::Validation("title and body required".to_string()));
    }

    let notification = Notification {
        id: Uuid::new_v4(),
        title: new.title,
        body: new.body,
        kind: new.kind,
        status: NotificationStatus::Unread,
        actor_role: new.actor_role,
        meta: new.meta,
        due_at: new.due_at,
        created_at: Utc::now(),
    };
    state
        .store
        .notifications
        .insert(notification.id, notification.clone());

    info!(notification_id = %notification.id, kind = ?notification.kind, "notification created");
    Ok(notification)
}

/// Newest first, optionally restricted to one actor role.
pub fn list_notifications(state: &AppState, role: Option<ActorRole>) -> Vec<Notification> {
    collect_notifications(state, |n| role.is_none_or(|role| n.actor_role == role))
}

pub fn list_unread(state: &AppState, role: Option<ActorRole>) -> Vec<Notification> {
    collect_notifications(state, |n| {
        n.status.is_unread() && role.is_none_or(|role| n.actor_role == role)
    })
}

fn collect_notifications(
    state: &AppState,
    predicate: impl Fn(&Notification) -> bool,
) -> Vec<Notification> {
    let mut notifications: Vec<Notification> = state
        .store
        .notifications
        .iter()
        .filter(|entry| predicate(entry.value()))
        .map(|entry| entry.value().clone())
        .collect();
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    notifications
}

pub fn update_status(
    state: &AppState,
    id: Uuid,
    status: NotificationStatus,
) -> Result<Notification, AppError> {
    let mut notification = state
        .store
        .notifications
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;

    notification.status = status;
    Ok(notification.clone())
}

/// Upserts a device token; a token re-registered by another agent moves to it.
pub fn register_token(state: &AppState, request: RegisterToken) -> Result<DeviceToken, AppError> {
    if request.token.trim().is_empty() || request.platform.trim().is_empty() {
        return Err(AppError::Validation("token and platform required".to_string()));
    }
    if let Some(agent_id) = request.agent_id {
        if !state.store.agent_exists(agent_id) {
            return Err(AppError::agent_not_found(agent_id));
        }
    }

    let device = DeviceToken {
        token: request.token,
        agent_id: request.agent_id,
        platform: request.platform,
        last_seen_at: Utc::now(),
    };
    state
        .store
        .device_tokens
        .insert(device.token.clone(), device.clone());

    Ok(device)
}

/// Returns whether the token was registered.
pub fn unregister_token(state: &AppState, token: &str) -> bool {
    state.store.device_tokens.remove(token).is_some()
}

pub fn tokens_for_agents(state: &AppState, agent_ids: &[Uuid]) -> Vec<String> {
    let mut tokens: Vec<String> = state
        .store
        .device_tokens
        .iter()
        .filter(|entry| {
            entry
                .value()
                .agent_id
                .is_some_and(|agent_id| agent_ids.contains(&agent_id))
        })
        .map(|entry| entry.key().clone())
        .collect();
    tokens.sort();
    tokens
}

/// Pushes `notification` to every device registered to `agent_ids`.
pub(crate) async fn push_to_agents(
    state: &AppState,
    agent_ids: &[Uuid],
    notification: &Notification,
    data: HashMap<String, String>,
) -> Result<PushSummary, AppError> {
    let tokens = tokens_for_agents(state, agent_ids);
    if tokens.is_empty() {
        return Ok(PushSummary::default());
    }

    let summary = send_chunked(
        state.push.as_ref(),
        &tokens,
        state.config.push_chunk_size,
        PushNotification {
            title: notification.title.clone(),
            body: notification.body.clone(),
        },
        data,
    )
    .await?;

    info!(
        notification_id = %notification.id,
        success = summary.success_count,
        failure = summary.failure_count,
        "push sent"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::engine::agents;
    use crate::models::agent::NewAgent;
    use crate::models::notification::NotificationKind;

    fn agent(state: &AppState) -> Uuid {
        agents::create_agent(
            state,
            NewAgent {
                name: "Arun".to_string(),
                phone: None,
                email: None,
                password: String::new(),
            },
        )
        .unwrap()
        .id
    }

    fn new_notification(role: ActorRole, meta: serde_json::Value) -> NewNotification {
        NewNotification {
            title: "Overdue".to_string(),
            body: "COL-1 is overdue".to_string(),
            kind: NotificationKind::Overdue,
            actor_role: role,
            meta,
            due_at: None,
        }
    }

    #[tokio::test]
    async fn unread_filters_by_role_and_status() {
        let state = AppState::with_defaults();
        let admin = create_notification(&state, new_notification(ActorRole::Admin, json!({})))
            .await
            .unwrap();
        create_notification(&state, new_notification(ActorRole::Agent, json!({})))
            .await
            .unwrap();

        assert_eq!(list_unread(&state, Some(ActorRole::Admin)).len(), 1);
        update_status(&state, admin.id, NotificationStatus::Done).unwrap();
        assert!(list_unread(&state, Some(ActorRole::Admin)).is_empty());
        assert_eq!(list_notifications(&state, None).len(), 2);
    }

    #[tokio::test]
    async fn empty_title_is_rejected() {
        let state = AppState::with_defaults();
        let mut new = new_notification(ActorRole::Admin, json!({}));
        new.title = " ".to_string();

        assert!(matches!(
            create_notification(&state, new).await,
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn tokens_are_scoped_to_agents() {
        let state = AppState::with_defaults();
        let (a1, a2) = (agent(&state), agent(&state));
        for (token, agent_id) in [("t1", a1), ("t2", a2), ("t3", a1)] {
            register_token(
                &state,
                RegisterToken {
                    token: token.to_string(),
                    platform: "android".to_string(),
                    agent_id: Some(agent_id),
                },
            )
            .unwrap();
        }

        assert_eq!(tokens_for_agents(&state, &[a1]), vec!["t1", "t3"]);
        assert!(unregister_token(&state, "t1"));
        assert!(!unregister_token(&state, "t1"));
        assert_eq!(tokens_for_agents(&state, &[a1]), vec!["t3"]);
    }

    #[tokio::test]
    async fn targeted_notification_reaches_agent_devices() {
        let state = AppState::with_defaults();
        let agent_id = agent(&state);
        register_token(
            &state,
            RegisterToken {
                token: "device-1".to_string(),
                platform: "ios".to_string(),
                agent_id: Some(agent_id),
            },
        )
        .unwrap();

        let notification = create_notification(
            &state,
            new_notification(
                ActorRole::Agent,
                json!({ "target_agent_id": agent_id.to_string() }),
            ),
        )
        .await
        .unwrap();

        let summary = push_to_agents(&state, &[agent_id], &notification, HashMap::new())
            .await
            .unwrap();
        assert_eq!(summary.success_count, 1);
    }
}
