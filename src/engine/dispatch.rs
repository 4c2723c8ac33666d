use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::{self, StartPlan, StatusRoute};
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::collection::{
    Collection, CollectionFilter, CollectionPatch, CollectionStatus, NewCollection, StatusExtra,
};
use crate::models::event::DispatchEvent;
use crate::models::ping::{CollectionPingPayload, LocationPing};
use crate::state::AppState;
use crate::store::PingRecord;

#[derive(Debug, Clone, Serialize)]
pub struct AssignOutcome {
    pub assignment: Assignment,
    pub collection: Collection,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingStarted {
    pub started_at: Option<DateTime<Utc>>,
    pub collection: Collection,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingStopped {
    pub stopped_at: DateTime<Utc>,
    pub collection: Collection,
}

/// Final position reported when an agent stops tracking.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct StopTracking {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub battery_level: Option<f64>,
}

pub fn create_collection(state: &AppState, new: NewCollection) -> Result<Collection, AppError> {
    let started = Instant::now();
    let result = create_collection_inner(state, new);
    observe(state, "create", started, &result);
    result
}

fn create_collection_inner(state: &AppState, new: NewCollection) -> Result<Collection, AppError> {
    new.validate()?;
    let requested_agent = new.assigned_agent_id;
    let row = new.into_collection(Utc::now());

    let (assignment, collection) = state.store.insert_collection(row, |tx| {
        let Some(agent_id) = requested_agent else {
            return Ok(None);
        };
        if !tx.agent_exists(agent_id) {
            return Err(AppError::agent_not_found(agent_id));
        }
        let entry = tx.bind_agent(agent_id);
        tx.row_mut().status = CollectionStatus::Assigned;
        Ok(Some(entry))
    })?;

    info!(collection_id = %collection.id, code = %collection.code, "collection created");
    if let Some(assignment) = assignment {
        state.publish(DispatchEvent::Assigned { assignment });
    }

    Ok(collection)
}

pub fn get_collection(state: &AppState, id: Uuid) -> Result<Collection, AppError> {
    state
        .store
        .collection(id)
        .ok_or_else(|| AppError::collection_not_found(id))
}

/// Newest first.
pub fn list_collections(state: &AppState, filter: &CollectionFilter) -> Vec<Collection> {
    let mut collections = state.store.collections_where(|c| filter.matches(c));
    collections.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    collections
}

/// Work still open for the field: pending or assigned, oldest due first.
pub fn pending_collections(state: &AppState, agent_id: Option<Uuid>) -> Vec<Collection> {
    let mut collections = state.store.collections_where(|c| {
        matches!(c.status, CollectionStatus::Pending | CollectionStatus::Assigned)
            && agent_id.is_none_or(|agent| c.assigned_agent_id == Some(agent))
    });
    collections.sort_by(|a, b| {
        let a_due = a.due_at.unwrap_or(DateTime::<Utc>::MAX_UTC);
        let b_due = b.due_at.unwrap_or(DateTime::<Utc>::MAX_UTC);
        a_due.cmp(&b_due).then(b.created_at.cmp(&a.created_at))
    });
    collections
}

pub fn update_collection(
    state: &AppState,
    id: Uuid,
    patch: CollectionPatch,
) -> Result<Collection, AppError> {
    let ((), collection) = state
        .store
        .collection_tx(id, |tx| patch.apply(tx.row_mut()))?;

    info!(collection_id = %id, "collection updated");
    Ok(collection)
}

pub fn delete_collection(state: &AppState, id: Uuid) -> Result<(), AppError> {
    let (before, _) = state.store.collection_tx(id, |tx| {
        let before = tx.row().status;
        tx.row_mut().deleted_at = Some(tx.now());
        Ok(before)
    })?;

    if before == CollectionStatus::InProgress {
        state.metrics.collections_tracking.dec();
    }
    info!(collection_id = %id, "collection soft-deleted");
    Ok(())
}

pub fn assign(state: &AppState, collection_id: Uuid, agent_id: Uuid) -> Result<AssignOutcome, AppError> {
    let started = Instant::now();
    let result = assign_inner(state, collection_id, agent_id);
    observe(state, "assign", started, &result);
    result
}

fn assign_inner(
    state: &AppState,
    collection_id: Uuid,
    agent_id: Uuid,
) -> Result<AssignOutcome, AppError> {
    if !state.store.agent_exists(agent_id) {
        return Err(AppError::agent_not_found(agent_id));
    }

    let (assignment, collection) = state.store.collection_tx(collection_id, |tx| {
        lifecycle::check_assignable(tx.row())?;
        let entry = tx.bind_agent(agent_id);
        tx.row_mut().status = CollectionStatus::Assigned;
        Ok(entry)
    })?;

    info!(
        collection_id = %collection_id,
        agent_id = %agent_id,
        reassigned_from = ?assignment.reassigned_from_id,
        "collection assigned"
    );
    state.publish(DispatchEvent::Assigned {
        assignment: assignment.clone(),
    });

    Ok(AssignOutcome {
        assignment,
        collection,
    })
}

pub fn start_tracking(
    state: &AppState,
    collection_id: Uuid,
    agent_id: Uuid,
) -> Result<TrackingStarted, AppError> {
    let started = Instant::now();
    let result = start_tracking_inner(state, collection_id, agent_id);
    observe(state, "start_tracking", started, &result);
    result
}

fn start_tracking_inner(
    state: &AppState,
    collection_id: Uuid,
    agent_id: Uuid,
) -> Result<TrackingStarted, AppError> {
    let (plan, collection) = state.store.collection_tx(collection_id, |tx| {
        let plan = lifecycle::plan_start(tx.row(), agent_id)?;
        let StartPlan::Begin { bind_agent } = plan else {
            return Ok((plan, None));
        };

        let bound = if bind_agent {
            if !tx.agent_exists(agent_id) {
                return Err(AppError::agent_not_found(agent_id));
            }
            Some(tx.bind_agent(agent_id))
        } else {
            None
        };
        let now = tx.now();
        let row = tx.row_mut();
        row.status = CollectionStatus::InProgress;
        row.tracking_started_at = Some(now);
        Ok((plan, bound))
    })?;

    let (plan, bound) = plan;
    match plan {
        StartPlan::AlreadyTracking => {
            info!(collection_id = %collection_id, agent_id = %agent_id, "tracking already active");
        }
        StartPlan::Begin { .. } => {
            state.metrics.collections_tracking.inc();
            info!(collection_id = %collection_id, agent_id = %agent_id, "tracking started");
            if let Some(assignment) = bound {
                state.publish(DispatchEvent::Assigned { assignment });
            }
            if let Some(started_at) = collection.tracking_started_at {
                state.publish(DispatchEvent::TrackingStarted {
                    collection_id,
                    agent_id,
                    started_at,
                });
            }
        }
    }

    Ok(TrackingStarted {
        started_at: collection.tracking_started_at,
        collection,
    })
}

pub fn stop_tracking(
    state: &AppState,
    collection_id: Uuid,
    agent_id: Uuid,
    stop: StopTracking,
) -> Result<TrackingStopped, AppError> {
    let started = Instant::now();
    let result = stop_tracking_inner(state, collection_id, agent_id, stop);
    observe(state, "stop_tracking", started, &result);
    result
}

fn stop_tracking_inner(
    state: &AppState,
    collection_id: Uuid,
    agent_id: Uuid,
    stop: StopTracking,
) -> Result<TrackingStopped, AppError> {
    let (before, collection) = state.store.collection_tx(collection_id, |tx| {
        let before = tx.row().status;
        let next = lifecycle::plan_stop(tx.row(), agent_id)?;
        let now = tx.now();
        let row = tx.row_mut();
        row.status = next;
        row.tracking_stopped_at = Some(now);
        row.apply_location(stop.lat, stop.lng, stop.battery_level);
        Ok(before)
    })?;

    if before == CollectionStatus::InProgress {
        state.metrics.collections_tracking.dec();
    }

    let stopped_at = collection.tracking_stopped_at.unwrap_or(collection.updated_at);
    info!(
        collection_id = %collection_id,
        agent_id = %agent_id,
        status = %collection.status,
        "tracking stopped"
    );
    state.publish(DispatchEvent::TrackingStopped {
        collection_id,
        agent_id,
        stopped_at,
    });

    Ok(TrackingStopped {
        stopped_at,
        collection,
    })
}

/// Stores a ping against a collection. Never fails on a missing collection:
/// the sample is kept and only the location cache update is skipped.
pub fn save_ping(
    state: &AppState,
    collection_id: Uuid,
    agent_id: Uuid,
    payload: CollectionPingPayload,
) -> LocationPing {
    let ping = state.store.pings.append(PingRecord {
        collection_id: Some(collection_id),
        agent_id,
        lat: payload.lat,
        lng: payload.lng,
        battery_level: payload.battery_level,
        stop: false,
        ts: payload.ts,
        raw: payload.raw,
    });
    state
        .metrics
        .pings_ingested_total
        .with_label_values(&["collection"])
        .inc();

    refresh_location_cache(state, &ping);
    state.publish(DispatchEvent::Ping { ping: ping.clone() });
    ping
}

/// Copies a ping's coordinates onto its collection's last-known-location cache.
/// A ping older than the cached one is kept in the log but leaves the cache alone.
pub(crate) fn refresh_location_cache(state: &AppState, ping: &LocationPing) {
    let Some(collection_id) = ping.collection_id else {
        return;
    };

    let result = state.store.collection_tx(collection_id, |tx| {
        if tx.row().last_ping_at.is_some_and(|last| ping.ts < last) {
            debug!(collection_id = %collection_id, ts = %ping.ts, "out-of-order ping; cache kept");
            return Ok(());
        }
        let row = tx.row_mut();
        row.apply_location(ping.lat, ping.lng, ping.battery_level);
        row.last_ping_at = Some(ping.ts);
        Ok(())
    });

    if let Err(err) = result {
        warn!(
            collection_id = %collection_id,
            agent_id = %ping.agent_id,
            error = %err,
            "ping stored without location cache update"
        );
    }
}

pub fn mark_collected(
    state: &AppState,
    collection_id: Uuid,
    extra: StatusExtra,
) -> Result<Collection, AppError> {
    let started = Instant::now();
    let result = close(state, collection_id, CollectionStatus::Collected, extra);
    observe(state, "mark_collected", started, &result);
    result
}

pub fn mark_delivered(
    state: &AppState,
    collection_id: Uuid,
    extra: StatusExtra,
) -> Result<Collection, AppError> {
    let started = Instant::now();
    let result = close(state, collection_id, CollectionStatus::Completed, extra);
    observe(state, "mark_delivered", started, &result);
    result
}

fn close(
    state: &AppState,
    collection_id: Uuid,
    target: CollectionStatus,
    extra: StatusExtra,
) -> Result<Collection, AppError> {
    extra.validate()?;
    let (before, collection) = state.store.collection_tx(collection_id, |tx| {
        let before = tx.row().status;
        lifecycle::check_close(tx.row(), target)?;
        let now = tx.now();
        let row = tx.row_mut();
        row.status = target;
        match target {
            CollectionStatus::Collected => {
                row.collected_at = Some(now);
                if extra.collected_amount.is_some() {
                    row.collected_amount = extra.collected_amount;
                }
            }
            _ => row.delivered_at = Some(now),
        }
        if extra.notes.is_some() {
            row.notes = extra.notes;
        }
        if extra.proof_url.is_some() {
            row.proof_url = extra.proof_url;
        }
        Ok(before)
    })?;

    if before == CollectionStatus::InProgress {
        state.metrics.collections_tracking.dec();
    }
    info!(collection_id = %collection_id, status = %target, "collection closed");
    state.publish(DispatchEvent::StatusChanged {
        collection_id,
        status: target,
    });

    Ok(collection)
}

pub fn update_status(
    state: &AppState,
    collection_id: Uuid,
    status: CollectionStatus,
    extra: StatusExtra,
) -> Result<Collection, AppError> {
    let current = get_collection(state, collection_id)?;
    match lifecycle::route_status_update(&current, status)? {
        StatusRoute::Collect => return mark_collected(state, collection_id, extra),
        StatusRoute::Deliver => return mark_delivered(state, collection_id, extra),
        StatusRoute::Set(_) => {}
    }

    let started = Instant::now();
    let result = set_status(state, collection_id, status, extra);
    observe(state, "update_status", started, &result);
    result
}

fn set_status(
    state: &AppState,
    collection_id: Uuid,
    status: CollectionStatus,
    extra: StatusExtra,
) -> Result<Collection, AppError> {
    extra.validate()?;
    let (before, collection) = state.store.collection_tx(collection_id, |tx| {
        // Re-checked under the row lock; the row may have moved since routing.
        let before = tx.row().status;
        let StatusRoute::Set(target) = lifecycle::route_status_update(tx.row(), status)? else {
            return Err(AppError::Conflict(format!(
                "collection {collection_id} changed while updating status"
            )));
        };
        let row = tx.row_mut();
        row.status = target;
        if extra.notes.is_some() {
            row.notes = extra.notes;
        }
        if extra.proof_url.is_some() {
            row.proof_url = extra.proof_url;
        }
        if extra.collected_amount.is_some() {
            row.collected_amount = extra.collected_amount;
        }
        Ok(before)
    })?;

    if before == CollectionStatus::InProgress {
        state.metrics.collections_tracking.dec();
    }
    info!(collection_id = %collection_id, status = %status, "collection status updated");
    state.publish(DispatchEvent::StatusChanged {
        collection_id,
        status,
    });

    Ok(collection)
}

fn observe<T>(state: &AppState, operation: &str, started: Instant, result: &Result<T, AppError>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(err) => {
            warn!(operation, error = %err, "collection operation rejected");
            err.kind()
        }
    };

    state
        .metrics
        .transition_latency_seconds
        .with_label_values(&[operation])
        .observe(started.elapsed().as_secs_f64());
    state
        .metrics
        .transitions_total
        .with_label_values(&[operation, outcome])
        .inc();
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::agent::{Agent, AgentStatus};
    use crate::models::collection::CollectionType;

    fn state() -> AppState {
        AppState::with_defaults()
    }

    fn agent(state: &AppState) -> Uuid {
        let now = Utc::now();
        let agent = Agent {
            id: Uuid::new_v4(),
            name: "Ravi".to_string(),
            phone: None,
            email: None,
            is_active: true,
            status: AgentStatus::OffDuty,
            last_seen_at: None,
            password_hash: String::new(),
            created_at: now,
            updated_at: now,
        };
        let id = agent.id;
        state.store.agents.insert(id, agent);
        id
    }

    fn new_collection() -> NewCollection {
        NewCollection {
            code: None,
            title: "Cash pickup".to_string(),
            address: "12 Anna Salai".to_string(),
            amount: 500.0,
            collection_type: CollectionType::Pickup,
            area: None,
            city: Some("Chennai".to_string()),
            customer_id: None,
            assigned_agent_id: None,
            due_at: None,
        }
    }

    fn pending(state: &AppState) -> Uuid {
        create_collection(state, new_collection()).unwrap().id
    }

    #[test]
    fn reassignment_moves_pointer_and_keeps_both_ledger_entries() {
        let state = state();
        let (a1, a2) = (agent(&state), agent(&state));
        let id = pending(&state);

        let first = assign(&state, id, a1).unwrap();
        let second = assign(&state, id, a2).unwrap();

        assert_eq!(second.collection.assigned_agent_id, Some(a2));
        assert_eq!(second.collection.status, CollectionStatus::Assigned);
        let history = state.store.ledger.history_for(id);
        assert_eq!(history.len(), 2);
        assert_eq!(first.assignment.reassigned_from_id, None);
        assert_eq!(second.assignment.reassigned_from_id, Some(first.assignment.id));
    }

    #[test]
    fn assign_requires_known_agent_and_collection() {
        let state = state();
        let id = pending(&state);
        assert!(matches!(
            assign(&state, id, Uuid::new_v4()),
            Err(AppError::NotFound(_))
        ));

        let agent_id = agent(&state);
        assert!(matches!(
            assign(&state, Uuid::new_v4(), agent_id),
            Err(AppError::NotFound(_))
        ));
        assert!(state.store.ledger.is_empty());
    }

    #[test]
    fn create_with_agent_writes_initial_ledger_entry() {
        let state = state();
        let agent_id = agent(&state);
        let mut new = new_collection();
        new.assigned_agent_id = Some(agent_id);

        let collection = create_collection(&state, new).unwrap();
        assert_eq!(collection.status, CollectionStatus::Assigned);
        assert_eq!(state.store.ledger.history_for(collection.id).len(), 1);
    }

    #[test]
    fn create_with_unknown_agent_leaves_nothing_behind() {
        let state = state();
        let mut new = new_collection();
        new.assigned_agent_id = Some(Uuid::new_v4());

        assert!(matches!(
            create_collection(&state, new),
            Err(AppError::NotFound(_))
        ));
        assert_eq!(state.store.collection_count(), 0);
        assert!(state.store.ledger.is_empty());
    }

    #[test]
    fn start_tracking_twice_keeps_first_stamp() {
        let state = state();
        let agent_id = agent(&state);
        let id = pending(&state);

        let first = start_tracking(&state, id, agent_id).unwrap();
        let second = start_tracking(&state, id, agent_id).unwrap();

        assert!(first.started_at.is_some());
        assert_eq!(first.started_at, second.started_at);
        assert_eq!(second.collection.status, CollectionStatus::InProgress);
        assert_eq!(state.metrics.collections_tracking.get(), 1);
    }

    #[test]
    fn start_tracking_unassigned_binds_through_the_ledger() {
        let state = state();
        let agent_id = agent(&state);
        let id = pending(&state);

        let started = start_tracking(&state, id, agent_id).unwrap();

        assert_eq!(started.collection.assigned_agent_id, Some(agent_id));
        let latest = state.store.ledger.latest_for(id).unwrap();
        assert_eq!(latest.agent_id, agent_id);
    }

    #[test]
    fn second_agent_cannot_take_over_tracking() {
        let state = state();
        let (a1, a2) = (agent(&state), agent(&state));
        let id = pending(&state);

        start_tracking(&state, id, a1).unwrap();
        assert!(matches!(
            start_tracking(&state, id, a2),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(assign(&state, id, a2), Err(AppError::Conflict(_))));
        assert_eq!(get_collection(&state, id).unwrap().assigned_agent_id, Some(a1));
    }

    #[test]
    fn stop_tracking_by_other_agent_is_rejected() {
        let state = state();
        let (a1, a2) = (agent(&state), agent(&state));
        let id = pending(&state);
        start_tracking(&state, id, a1).unwrap();

        assert!(matches!(
            stop_tracking(&state, id, a2, StopTracking::default()),
            Err(AppError::Conflict(_))
        ));
        let collection = get_collection(&state, id).unwrap();
        assert_eq!(collection.status, CollectionStatus::InProgress);
        assert!(collection.tracking_stopped_at.is_none());
    }

    #[test]
    fn terminal_status_survives_start_and_stop() {
        let state = state();
        let agent_id = agent(&state);
        let id = pending(&state);
        assign(&state, id, agent_id).unwrap();
        mark_delivered(&state, id, StatusExtra::default()).unwrap();

        assert!(start_tracking(&state, id, agent_id).is_err());
        let stopped = stop_tracking(&state, id, agent_id, StopTracking::default()).unwrap();

        assert_eq!(stopped.collection.status, CollectionStatus::Completed);
        assert!(stopped.collection.delivered_at.is_some());
    }

    #[test]
    fn stop_updates_only_reported_location_fields() {
        let state = state();
        let agent_id = agent(&state);
        let id = pending(&state);
        start_tracking(&state, id, agent_id).unwrap();
        save_ping(
            &state,
            id,
            agent_id,
            CollectionPingPayload {
                lat: Some(13.0),
                lng: Some(80.2),
                battery_level: Some(90.0),
                ..CollectionPingPayload::default()
            },
        );

        let stopped = stop_tracking(
            &state,
            id,
            agent_id,
            StopTracking {
                lat: Some(13.1),
                lng: None,
                battery_level: Some(75.0),
            },
        )
        .unwrap();

        assert_eq!(stopped.collection.last_lat, Some(13.1));
        assert_eq!(stopped.collection.last_lng, Some(80.2));
        assert_eq!(stopped.collection.battery_level, Some(75.0));
        assert_eq!(stopped.collection.status, CollectionStatus::Assigned);
        assert_eq!(state.metrics.collections_tracking.get(), 0);
    }

    #[test]
    fn save_ping_for_unknown_collection_is_still_stored() {
        let state = state();
        let ping = save_ping(
            &state,
            Uuid::new_v4(),
            Uuid::new_v4(),
            CollectionPingPayload::default(),
        );

        assert_eq!(state.store.pings.len(), 1);
        assert!(ping.lat.is_none());
    }

    #[test]
    fn generic_update_cannot_reopen_a_collected_collection() {
        let state = state();
        let agent_id = agent(&state);
        let id = pending(&state);
        assign(&state, id, agent_id).unwrap();
        mark_collected(
            &state,
            id,
            StatusExtra {
                collected_amount: Some(500.0),
                ..StatusExtra::default()
            },
        )
        .unwrap();

        assert!(matches!(
            update_status(&state, id, CollectionStatus::Pending, StatusExtra::default()),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            mark_delivered(&state, id, StatusExtra::default()),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(
            get_collection(&state, id).unwrap().status,
            CollectionStatus::Collected
        );
    }

    #[test]
    fn generic_update_delegates_to_close_operations() {
        let state = state();
        let agent_id = agent(&state);
        let id = pending(&state);
        assign(&state, id, agent_id).unwrap();

        let done = update_status(
            &state,
            id,
            CollectionStatus::Completed,
            StatusExtra {
                notes: Some("left with guard".to_string()),
                ..StatusExtra::default()
            },
        )
        .unwrap();

        assert_eq!(done.status, CollectionStatus::Completed);
        assert!(done.delivered_at.is_some());
        assert_eq!(done.notes.as_deref(), Some("left with guard"));
    }

    #[test]
    fn cancelling_a_tracked_collection_releases_the_gauge() {
        let state = state();
        let agent_id = agent(&state);
        let id = pending(&state);
        start_tracking(&state, id, agent_id).unwrap();

        let cancelled =
            update_status(&state, id, CollectionStatus::Cancelled, StatusExtra::default()).unwrap();

        assert_eq!(cancelled.status, CollectionStatus::Cancelled);
        assert_eq!(state.metrics.collections_tracking.get(), 0);
    }

    #[test]
    fn deleted_collections_disappear_from_lists() {
        let state = state();
        let id = pending(&state);
        pending(&state);

        delete_collection(&state, id).unwrap();

        assert_eq!(list_collections(&state, &CollectionFilter::default()).len(), 1);
        assert!(matches!(get_collection(&state, id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn pending_list_filters_by_agent() {
        let state = state();
        let agent_id = agent(&state);
        let mine = pending(&state);
        pending(&state);
        assign(&state, mine, agent_id).unwrap();

        let open = pending_collections(&state, Some(agent_id));
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, mine);
        assert_eq!(pending_collections(&state, None).len(), 2);
    }

    #[test]
    fn concurrent_assigns_keep_a_consistent_ledger_chain() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 25;

        let state = state();
        let agents: Vec<Uuid> = (0..4).map(|_| agent(&state)).collect();
        let id = pending(&state);

        std::thread::scope(|scope| {
            for worker in 0..THREADS {
                let (state, agents) = (&state, &agents);
                scope.spawn(move || {
                    for round in 0..ROUNDS {
                        let agent_id = agents[(worker + round) % agents.len()];
                        assign(state, id, agent_id).unwrap();
                    }
                });
            }
        });

        let history = state.store.ledger.history_for(id);
        assert_eq!(history.len(), THREADS * ROUNDS);
        assert_eq!(history[0].reassigned_from_id, None);
        for pair in history.windows(2) {
            assert_eq!(pair[1].reassigned_from_id, Some(pair[0].id));
            assert!(pair[1].sequence > pair[0].sequence);
        }
        let latest = history.last().unwrap();
        assert_eq!(
            get_collection(&state, id).unwrap().assigned_agent_id,
            Some(latest.agent_id)
        );
    }

    #[test]
    fn racing_assign_never_displaces_the_tracking_agent() {
        let state = state();
        let (a1, a2) = (agent(&state), agent(&state));

        for _ in 0..50 {
            let id = pending(&state);
            let barrier = std::sync::Barrier::new(2);

            let (started, assigned) = std::thread::scope(|scope| {
                let start = scope.spawn(|| {
                    barrier.wait();
                    start_tracking(&state, id, a1)
                });
                let reassign = scope.spawn(|| {
                    barrier.wait();
                    assign(&state, id, a2)
                });
                (start.join().unwrap(), reassign.join().unwrap())
            });

            assert!(started.is_ok() != assigned.is_ok());
            let collection = get_collection(&state, id).unwrap();
            let latest = state.store.ledger.latest_for(id).unwrap();
            assert_eq!(collection.assigned_agent_id, Some(latest.agent_id));

            if started.is_ok() {
                assert!(matches!(assigned, Err(AppError::Conflict(_))));
                assert_eq!(collection.status, CollectionStatus::InProgress);
                assert_eq!(collection.assigned_agent_id, Some(a1));
                assert!(matches!(assign(&state, id, a2), Err(AppError::Conflict(_))));
            } else {
                assert!(matches!(started, Err(AppError::Conflict(_))));
                assert_eq!(collection.status, CollectionStatus::Assigned);
                assert_eq!(collection.assigned_agent_id, Some(a2));
            }
        }
    }

    #[test]
    fn out_of_order_ping_does_not_rewind_the_location_cache() {
        let state = state();
        let agent_id = agent(&state);
        let id = pending(&state);
        let now = Utc::now();

        save_ping(
            &state,
            id,
            agent_id,
            CollectionPingPayload {
                lat: Some(13.05),
                lng: Some(80.25),
                ts: Some(now),
                ..CollectionPingPayload::default()
            },
        );
        save_ping(
            &state,
            id,
            agent_id,
            CollectionPingPayload {
                lat: Some(12.90),
                lng: Some(80.10),
                ts: Some(now - chrono::TimeDelta::minutes(5)),
                ..CollectionPingPayload::default()
            },
        );

        let cached = get_collection(&state, id).unwrap();
        assert_eq!(cached.last_lat, Some(13.05));
        assert_eq!(cached.last_lng, Some(80.25));
        assert_eq!(cached.last_ping_at, Some(now));
        assert_eq!(state.store.pings.len(), 2);
    }

    #[test]
    fn negative_collected_amount_is_rejected_before_closing() {
        let state = state();
        let agent_id = agent(&state);
        let id = pending(&state);
        assign(&state, id, agent_id).unwrap();
        let refund = StatusExtra {
            collected_amount: Some(-1.0),
            ..StatusExtra::default()
        };

        assert!(matches!(
            mark_collected(&state, id, refund.clone()),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            update_status(&state, id, CollectionStatus::Cancelled, refund),
            Err(AppError::Validation(_))
        ));
        let collection = get_collection(&state, id).unwrap();
        assert_eq!(collection.status, CollectionStatus::Assigned);
        assert!(collection.collected_amount.is_none());
    }
}
