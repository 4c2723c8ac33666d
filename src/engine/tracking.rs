use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::dispatch;
use crate::error::AppError;
use crate::models::agent::AgentStatus;
use crate::models::event::DispatchEvent;
use crate::models::ping::{LocationPing, PushPing};
use crate::state::AppState;
use crate::store::PingRecord;

/// Validates and stores a standalone tracking ping, then refreshes the
/// agent's duty status and the named collection's location cache.
pub fn push_ping(state: &AppState, ping: PushPing) -> Result<LocationPing, AppError> {
    let valid = ping.validate()?;

    let stored = state.store.pings.append(PingRecord {
        collection_id: valid.collection_id,
        agent_id: valid.agent_id,
        lat: Some(valid.point.lat),
        lng: Some(valid.point.lng),
        battery_level: valid.battery_level,
        stop: valid.stop,
        ts: valid.ts,
        raw: valid.raw,
    });
    state
        .metrics
        .pings_ingested_total
        .with_label_values(&["tracking"])
        .inc();

    if let Some(mut agent) = state.store.agents.get_mut(&stored.agent_id) {
        agent.status = AgentStatus::from_ping(stored.stop);
        agent.last_seen_at = Some(stored.recorded_at);
        agent.updated_at = stored.recorded_at;
    } else {
        debug!(agent_id = %stored.agent_id, "ping from unregistered agent");
    }

    dispatch::refresh_location_cache(state, &stored);

    if stored.stop {
        info!(agent_id = %stored.agent_id, ts = %stored.ts, "agent reported a stop");
    }
    state.publish(DispatchEvent::Ping {
        ping: stored.clone(),
    });

    Ok(stored)
}

pub fn latest_by_agents(
    state: &AppState,
    agent_ids: &[Uuid],
) -> HashMap<Uuid, Option<LocationPing>> {
    state.store.pings.latest_by_agents(agent_ids)
}

/// Stop pings on `date` in the server's configured UTC offset.
pub fn stops_count(state: &AppState, agent_id: Uuid, date: NaiveDate) -> Result<usize, AppError> {
    state
        .store
        .pings
        .stops_count(agent_id, date, state.config.server_utc_offset)
}
