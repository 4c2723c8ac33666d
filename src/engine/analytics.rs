//! Read-only reporting over collections, the assignment ledger and pings.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::dispatch;
use crate::error::AppError;
use crate::geo::path_length_km;
use crate::models::agent::AgentStatus;
use crate::models::assignment::Assignment;
use crate::models::collection::CollectionStatus;
use crate::models::ping::GeoPoint;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary {
    pub total_collections: usize,
    pub pending: usize,
    pub completed: usize,
    pub agents_active: usize,
    pub by_status: BTreeMap<CollectionStatus, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveAgent {
    pub agent_id: Uuid,
    pub name: String,
    pub status: AgentStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub last_location: Option<GeoPoint>,
    pub battery_level: Option<f64>,
    pub stops_today: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripHistory {
    pub collection_id: Uuid,
    pub code: String,
    pub status: CollectionStatus,
    pub agent_id: Option<Uuid>,
    pub assignments: Vec<Assignment>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub ping_count: usize,
    pub distance_km: f64,
}

pub fn summary(state: &AppState) -> DispatchSummary {
    let mut by_status: BTreeMap<CollectionStatus, usize> =
        CollectionStatus::ALL.iter().map(|status| (*status, 0)).collect();

    for collection in state.store.collections_where(|_| true) {
        *by_status.entry(collection.status).or_default() += 1;
    }

    let agents_active = state
        .store
        .agents
        .iter()
        .filter(|entry| entry.value().is_active)
        .count();

    DispatchSummary {
        total_collections: by_status.values().sum(),
        pending: by_status[&CollectionStatus::Pending],
        completed: by_status[&CollectionStatus::Completed],
        agents_active,
        by_status,
    }
}

/// Position and stop count for every active agent on `today`.
pub fn live_agents(state: &AppState, today: NaiveDate) -> Result<Vec<LiveAgent>, AppError> {
    let agents: Vec<_> = state
        .store
        .agents
        .iter()
        .filter(|entry| entry.value().is_active)
        .map(|entry| entry.value().clone())
        .collect();
    let ids: Vec<Uuid> = agents.iter().map(|agent| agent.id).collect();
    let mut latest = state.store.pings.latest_by_agents(&ids);
    let offset = state.config.server_utc_offset;

    let mut live: Vec<LiveAgent> = agents
        .into_iter()
        .map(|agent| {
            let ping = latest.remove(&agent.id).flatten();
            Ok(LiveAgent {
                agent_id: agent.id,
                stops_today: state.store.pings.stops_count(agent.id, today, offset)?,
                last_seen_at: ping
                    .as_ref()
                    .map(|ping| ping.recorded_at)
                    .or(agent.last_seen_at),
                last_location: ping.as_ref().and_then(|ping| ping.point()),
                battery_level: ping.and_then(|ping| ping.battery_level),
                name: agent.name,
                status: agent.status,
            })
        })
        .collect::<Result<_, AppError>>()?;

    live.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
    Ok(live)
}

pub fn trip_history(state: &AppState, collection_id: Uuid) -> Result<TripHistory, AppError> {
    let collection = dispatch::get_collection(state, collection_id)?;
    let pings = state.store.pings.for_collection(collection_id);

    Ok(TripHistory {
        collection_id,
        code: collection.code,
        status: collection.status,
        agent_id: collection.assigned_agent_id,
        assignments: state.store.ledger.history_for(collection_id),
        started_at: collection.tracking_started_at,
        stopped_at: collection.tracking_stopped_at,
        closed_at: collection.delivered_at.or(collection.collected_at),
        ping_count: pings.len(),
        distance_km: path_length_km(&pings),
    })
}

/// Every ledger entry naming the agent, newest first.
pub fn agent_history(state: &AppState, agent_id: Uuid) -> Result<Vec<Assignment>, AppError> {
    if !state.store.agent_exists(agent_id) {
        return Err(AppError::agent_not_found(agent_id));
    }
    Ok(state.store.ledger.history_for_agent(agent_id))
}
