use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    Pickup,
    Delivery,
    Service,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Pending,
    Assigned,
    InProgress,
    Collected,
    Completed,
    Cancelled,
}

impl CollectionStatus {
    pub const ALL: [CollectionStatus; 6] = [
        CollectionStatus::Pending,
        CollectionStatus::Assigned,
        CollectionStatus::InProgress,
        CollectionStatus::Collected,
        CollectionStatus::Completed,
        CollectionStatus::Cancelled,
    ];

    /// Collected and completed never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, CollectionStatus::Collected | CollectionStatus::Completed)
    }

    /// Statuses that are only valid while an agent holds the assignment.
    pub fn requires_agent(self) -> bool {
        match self {
            CollectionStatus::Assigned
            | CollectionStatus::InProgress
            | CollectionStatus::Collected
            | CollectionStatus::Completed => true,
            CollectionStatus::Pending | CollectionStatus::Cancelled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CollectionStatus::Pending => "pending",
            CollectionStatus::Assigned => "assigned",
            CollectionStatus::InProgress => "in_progress",
            CollectionStatus::Collected => "collected",
            CollectionStatus::Completed => "completed",
            CollectionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        CollectionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == raw)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "unknown collection status: {raw}, expected one of pending/assigned/in_progress/collected/completed/cancelled"
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub code: String,
    pub title: String,
    pub address: String,
    #[serde(rename = "type")]
    pub collection_type: CollectionType,
    pub status: CollectionStatus,
    pub area: Option<String>,
    pub city: Option<String>,
    pub customer_id: Option<Uuid>,
    pub assigned_agent_id: Option<Uuid>,

    pub amount: f64,
    pub due_at: Option<DateTime<Utc>>,
    pub collected_amount: Option<f64>,
    pub collected_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub proof_url: Option<String>,
    pub notes: Option<String>,

    pub last_lat: Option<f64>,
    pub last_lng: Option<f64>,
    pub last_ping_at: Option<DateTime<Utc>>,
    pub battery_level: Option<f64>,
    pub tracking_started_at: Option<DateTime<Utc>>,
    pub tracking_stopped_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Collection {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Overwrites the last-known-location cache with whatever was reported.
    pub fn apply_location(
        &mut self,
        lat: Option<f64>,
        lng: Option<f64>,
        battery_level: Option<f64>,
    ) {
        if let Some(lat) = lat {
            self.last_lat = Some(lat);
        }
        if let Some(lng) = lng {
            self.last_lng = Some(lng);
        }
        if let Some(battery_level) = battery_level {
            self.battery_level = Some(battery_level);
        }
    }
}

/// Derives the human readable code, e.g. `COL-1A2B3C4D`.
pub fn code_for(id: Uuid) -> String {
    let simple = id.simple().to_string();
    format!("COL-{}", simple[..8].to_uppercase())
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCollection {
    pub code: Option<String>,
    pub title: String,
    pub address: String,
    pub amount: f64,
    #[serde(rename = "type", default = "default_collection_type")]
    pub collection_type: CollectionType,
    pub area: Option<String>,
    pub city: Option<String>,
    pub customer_id: Option<Uuid>,
    pub assigned_agent_id: Option<Uuid>,
    pub due_at: Option<DateTime<Utc>>,
}

fn default_collection_type() -> CollectionType {
    CollectionType::Pickup
}

impl NewCollection {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("title cannot be empty".to_string()));
        }
        if self.address.trim().is_empty() {
            return Err(AppError::Validation("address cannot be empty".to_string()));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(AppError::Validation("amount must be >= 0".to_string()));
        }
        Ok(())
    }

    /// Builds the pending row. Any requested agent is bound separately so the
    /// ledger entry is written alongside it.
    pub fn into_collection(self, now: DateTime<Utc>) -> Collection {
        let id = Uuid::new_v4();
        let code = self
            .code
            .filter(|code| !code.trim().is_empty())
            .unwrap_or_else(|| code_for(id));

        Collection {
            id,
            code,
            title: self.title,
            address: self.address,
            collection_type: self.collection_type,
            status: CollectionStatus::Pending,
            area: self.area,
            city: self.city,
            customer_id: self.customer_id,
            assigned_agent_id: None,
            amount: self.amount,
            due_at: self.due_at,
            collected_amount: None,
            collected_at: None,
            delivered_at: None,
            proof_url: None,
            notes: None,
            last_lat: None,
            last_lng: None,
            last_ping_at: None,
            battery_level: None,
            tracking_started_at: None,
            tracking_stopped_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Business fields an operator may edit; status and assignment are not among them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionPatch {
    pub title: Option<String>,
    pub address: Option<String>,
    pub area: Option<String>,
    pub city: Option<String>,
    pub amount: Option<f64>,
    pub due_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub customer_id: Option<Uuid>,
}

impl CollectionPatch {
    pub fn apply(self, collection: &mut Collection) -> Result<(), AppError> {
        if let Some(title) = self.title {
            if title.trim().is_empty() {
                return Err(AppError::Validation("title cannot be empty".to_string()));
            }
            collection.title = title;
        }
        if let Some(address) = self.address {
            if address.trim().is_empty() {
                return Err(AppError::Validation("address cannot be empty".to_string()));
            }
            collection.address = address;
        }
        if let Some(amount) = self.amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(AppError::Validation("amount must be >= 0".to_string()));
            }
            collection.amount = amount;
        }
        if self.area.is_some() {
            collection.area = self.area;
        }
        if self.city.is_some() {
            collection.city = self.city;
        }
        if self.due_at.is_some() {
            collection.due_at = self.due_at;
        }
        if self.notes.is_some() {
            collection.notes = self.notes;
        }
        if self.customer_id.is_some() {
            collection.customer_id = self.customer_id;
        }
        Ok(())
    }
}

/// Optional payload carried by status updates.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusExtra {
    pub collected_amount: Option<f64>,
    pub notes: Option<String>,
    pub proof_url: Option<String>,
}

impl StatusExtra {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(amount) = self.collected_amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(AppError::Validation(
                    "collected_amount must be >= 0".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectionFilter {
    pub status: Option<CollectionStatus>,
    pub agent_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
}

impl CollectionFilter {
    pub fn matches(&self, collection: &Collection) -> bool {
        self.status.is_none_or(|status| collection.status == status)
            && self
                .agent_id
                .is_none_or(|agent| collection.assigned_agent_id == Some(agent))
            && self
                .customer_id
                .is_none_or(|customer| collection.customer_id == Some(customer))
    }
}
