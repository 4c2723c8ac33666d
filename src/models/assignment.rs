use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable ledger entry binding one agent to one collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub agent_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    /// Previous entry for the same collection, if any.
    pub reassigned_from_id: Option<Uuid>,
    /// Store-wide append order.
    pub sequence: u64,
}
