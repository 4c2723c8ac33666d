use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::agent::{Agent, AgentStatus, NewAgent};
use crate::state::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentStatusUpdate {
    pub status: Option<AgentStatus>,
    pub is_active: Option<bool>,
}

pub fn create_agent(state: &AppState, new: NewAgent) -> Result<Agent, AppError> {
    let agent = new.into_agent()?;
    state.store.agents.insert(agent.id, agent.clone());

    info!(agent_id = %agent.id, name = %agent.name, "agent created");
    Ok(agent)
}

pub fn list_agents(state: &AppState) -> Vec<Agent> {
    let mut agents: Vec<Agent> = state
        .store
        .agents
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    agents.sort_by(|a, b| a.name.cmp(&b.name).then(a.created_at.cmp(&b.created_at)));
    agents
}

pub fn get_agent(state: &AppState, id: Uuid) -> Result<Agent, AppError> {
    state
        .store
        .agents
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::agent_not_found(id))
}

pub fn update_status(
    state: &AppState,
    id: Uuid,
    update: AgentStatusUpdate,
) -> Result<Agent, AppError> {
    if update.status.is_none() && update.is_active.is_none() {
        return Err(AppError::Validation(
            "status or is_active required".to_string(),
        ));
    }

    let mut agent = state
        .store
        .agents
        .get_mut(&id)
        .ok_or_else(|| AppError::agent_not_found(id))?;

    if let Some(status) = update.status {
        agent.status = status;
    }
    if let Some(is_active) = update.is_active {
        agent.is_active = is_active;
    }
    agent.updated_at = Utc::now();

    info!(agent_id = %id, status = ?agent.status, is_active = agent.is_active, "agent status updated");
    Ok(agent.clone())
}

pub fn touch_last_seen(
    state: &AppState,
    id: Uuid,
    seen_at: Option<DateTime<Utc>>,
) -> Result<Agent, AppError> {
    let mut agent = state
        .store
        .agents
        .get_mut(&id)
        .ok_or_else(|| AppError::agent_not_found(id))?;

    let now = Utc::now();
    agent.last_seen_at = Some(seen_at.unwrap_or(now));
    agent.updated_at = now;

    Ok(agent.clone())
}
