use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationPing {
    pub id: Uuid,
    pub collection_id: Option<Uuid>,
    pub agent_id: Uuid,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub battery_level: Option<f64>,
    pub stop: bool,
    /// Client-reported sample time.
    pub ts: DateTime<Utc>,
    /// Server arrival time.
    pub recorded_at: DateTime<Utc>,
    pub raw: serde_json::Value,
    #[serde(skip)]
    pub(crate) sequence: u64,
}

impl LocationPing {
    pub fn point(&self) -> Option<GeoPoint> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }
}

/// Body of a standalone tracking ping, as sent by the agent app.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPing {
    pub agent_id: Option<Uuid>,
    pub collection_id: Option<Uuid>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub battery_level: Option<f64>,
    #[serde(default)]
    pub stop: bool,
    pub ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// A `PushPing` that passed validation.
#[derive(Debug, Clone)]
pub struct ValidPing {
    pub agent_id: Uuid,
    pub collection_id: Option<Uuid>,
    pub point: GeoPoint,
    pub battery_level: Option<f64>,
    pub stop: bool,
    pub ts: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

impl PushPing {
    pub fn validate(self) -> Result<ValidPing, AppError> {
        let (Some(agent_id), Some(lat), Some(lng)) = (self.agent_id, self.lat, self.lng) else {
            return Err(AppError::Validation("agent_id, lat, lng required".to_string()));
        };

        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::Validation(format!("lat out of range: {lat}")));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(AppError::Validation(format!("lng out of range: {lng}")));
        }

        Ok(ValidPing {
            agent_id,
            collection_id: self.collection_id,
            point: GeoPoint { lat, lng },
            battery_level: self.battery_level,
            stop: self.stop,
            ts: self.ts,
            raw: self.raw,
        })
    }
}

/// Telemetry attached to a collection ping; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionPingPayload {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub battery_level: Option<f64>,
    pub ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub raw: serde_json::Value,
}
