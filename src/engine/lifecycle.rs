//! Transition rules for the collection lifecycle.
//!
//! `pending -> assigned -> in_progress -> {collected, completed}`, with any
//! non-terminal status able to move to `cancelled`. These functions only
//! decide; `engine::dispatch` applies the decision inside a store transaction.

use uuid::Uuid;

use crate::error::AppError;
use crate::models::collection::{Collection, CollectionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPlan {
    /// Same agent is already tracking; nothing to write.
    AlreadyTracking,
    /// Move to in_progress, binding the agent first when unassigned.
    Begin { bind_agent: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusRoute {
    Collect,
    Deliver,
    Set(CollectionStatus),
}

pub fn plan_start(collection: &Collection, agent_id: Uuid) -> Result<StartPlan, AppError> {
    match collection.status {
        CollectionStatus::InProgress => match collection.assigned_agent_id {
            Some(current) if current == agent_id => Ok(StartPlan::AlreadyTracking),
            _ => Err(AppError::Conflict(format!(
                "collection {} already tracked by another agent",
                collection.id
            ))),
        },
        CollectionStatus::Pending | CollectionStatus::Assigned => {
            match collection.assigned_agent_id {
                None => Ok(StartPlan::Begin { bind_agent: true }),
                Some(current) if current == agent_id => Ok(StartPlan::Begin { bind_agent: false }),
                Some(_) => Err(AppError::Conflict(format!(
                    "collection {} is assigned to another agent",
                    collection.id
                ))),
            }
        }
        CollectionStatus::Collected
        | CollectionStatus::Completed
        | CollectionStatus::Cancelled => Err(AppError::Conflict(format!(
            "collection {} is {}; tracking cannot start",
            collection.id, collection.status
        ))),
    }
}

pub fn check_assignable(collection: &Collection) -> Result<(), AppError> {
    match collection.status {
        CollectionStatus::Pending | CollectionStatus::Assigned => Ok(()),
        CollectionStatus::InProgress => Err(AppError::Conflict(format!(
            "collection {} is being tracked; stop tracking before reassigning",
            collection.id
        ))),
        CollectionStatus::Collected
        | CollectionStatus::Completed
        | CollectionStatus::Cancelled => Err(AppError::Conflict(format!(
            "collection {} is {}; it cannot be assigned",
            collection.id, collection.status
        ))),
    }
}

/// Status the collection holds after `agent_id` stops tracking it.
pub fn plan_stop(collection: &Collection, agent_id: Uuid) -> Result<CollectionStatus, AppError> {
    if let Some(current) = collection.assigned_agent_id {
        if current != agent_id {
            return Err(AppError::Conflict(format!(
                "agent mismatch for collection {}",
                collection.id
            )));
        }
    }

    Ok(match collection.status {
        CollectionStatus::InProgress => CollectionStatus::Assigned,
        other => other,
    })
}

/// Guards mark-collected and mark-delivered.
pub fn check_close(collection: &Collection, target: CollectionStatus) -> Result<(), AppError> {
    match collection.status {
        CollectionStatus::Collected
        | CollectionStatus::Completed
        | CollectionStatus::Cancelled => Err(AppError::Conflict(format!(
            "collection {} is {}; it cannot become {target}",
            collection.id, collection.status
        ))),
        CollectionStatus::Pending | CollectionStatus::Assigned | CollectionStatus::InProgress => {
            if collection.assigned_agent_id.is_none() {
                return Err(AppError::Validation(format!(
                    "collection {} has no assigned agent",
                    collection.id
                )));
            }
            Ok(())
        }
    }
}

/// Decides how a generic status update is carried out.
pub fn route_status_update(
    collection: &Collection,
    target: CollectionStatus,
) -> Result<StatusRoute, AppError> {
    if collection.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "collection {} is {}; terminal statuses never change",
            collection.id, collection.status
        )));
    }

    match target {
        CollectionStatus::Collected => Ok(StatusRoute::Collect),
        CollectionStatus::Completed => Ok(StatusRoute::Deliver),
        CollectionStatus::InProgress => Err(AppError::Validation(
            "in_progress is only reachable by starting tracking".to_string(),
        )),
        CollectionStatus::Cancelled => Ok(StatusRoute::Set(CollectionStatus::Cancelled)),
        CollectionStatus::Pending | CollectionStatus::Assigned => {
            if collection.status == CollectionStatus::InProgress {
                return Err(AppError::Conflict(format!(
                    "collection {} is being tracked; stop tracking first",
                    collection.id
                )));
            }
            if target.requires_agent() && collection.assigned_agent_id.is_none() {
                return Err(AppError::Validation(format!(
                    "collection {} has no assigned agent; assign one instead",
                    collection.id
                )));
            }
            Ok(StatusRoute::Set(target))
        }
    }
}
