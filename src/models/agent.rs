use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    OnDuty,
    Idle,
    OffDuty,
}

impl AgentStatus {
    /// Status implied by a tracking ping.
    pub fn from_ping(stop: bool) -> Self {
        if stop {
            AgentStatus::Idle
        } else {
            AgentStatus::OnDuty
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_active: bool,
    pub status: AgentStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub password: String,
}

impl NewAgent {
    pub fn into_agent(self) -> Result<Agent, AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("name cannot be empty".to_string()));
        }

        let now = Utc::now();
        Ok(Agent {
            id: Uuid::new_v4(),
            name: self.name,
            phone: self.phone,
            email: self.email,
            is_active: true,
            status: AgentStatus::OffDuty,
            last_seen_at: None,
            password_hash: hash_password(&self.password),
            created_at: now,
            updated_at: now,
        })
    }
}

pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_ping_means_idle() {
        assert_eq!(AgentStatus::from_ping(true), AgentStatus::Idle);
        assert_eq!(AgentStatus::from_ping(false), AgentStatus::OnDuty);
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let agent = NewAgent {
            name: "Ravi".to_string(),
            phone: None,
            email: None,
            password: "secret".to_string(),
        }
        .into_agent()
        .unwrap();

        assert_eq!(agent.password_hash, hash_password("secret"));
        let json = serde_json::to_value(&agent).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}
