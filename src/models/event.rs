use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::assignment::Assignment;
use crate::models::collection::CollectionStatus;
use crate::models::ping::LocationPing;

/// Live feed pushed to dashboard websocket subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    Assigned {
        assignment: Assignment,
    },
    TrackingStarted {
        collection_id: Uuid,
        agent_id: Uuid,
        started_at: DateTime<Utc>,
    },
    TrackingStopped {
        collection_id: Uuid,
        agent_id: Uuid,
        stopped_at: DateTime<Utc>,
    },
    StatusChanged {
        collection_id: Uuid,
        status: CollectionStatus,
    },
    Ping {
        ping: LocationPing,
    },
}
