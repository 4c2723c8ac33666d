//! In-process relational-style store.
//!
//! Collection rows are the only rows written together with another table (the
//! assignment ledger), so they are only mutated through [`Store::collection_tx`]
//! and [`Store::insert_collection`]. Both run the caller's closure against a
//! staged copy of the row while the row's map entry is locked, then commit the
//! staged row and its ledger appends together. An error from the closure, or a
//! failed constraint check, drops the staged copy and leaves both untouched.
//!
//! Closures must not touch `collections` themselves: the row lock is a DashMap
//! shard lock and re-entering the map from inside it can deadlock.

pub mod ledger;
pub mod pings;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::agent::Agent;
use crate::models::assignment::Assignment;
use crate::models::collection::Collection;
use crate::models::notification::{DeviceToken, Notification};
use crate::models::reminder::Reminder;

pub use ledger::AssignmentLedger;
pub use pings::{PingRecord, PingStore};

pub struct Store {
    collections: DashMap<Uuid, Collection>,
    pub ledger: AssignmentLedger,
    pub pings: PingStore,
    pub agents: DashMap<Uuid, Agent>,
    pub reminders: DashMap<Uuid, Reminder>,
    pub notifications: DashMap<Uuid, Notification>,
    pub device_tokens: DashMap<String, DeviceToken>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            ledger: AssignmentLedger::new(),
            pings: PingStore::new(),
            agents: DashMap::new(),
            reminders: DashMap::new(),
            notifications: DashMap::new(),
            device_tokens: DashMap::new(),
        }
    }

    /// Live (not soft-deleted) collection by id.
    pub fn collection(&self, id: Uuid) -> Option<Collection> {
        self.collections
            .get(&id)
            .filter(|row| !row.is_deleted())
            .map(|row| row.value().clone())
    }

    /// Snapshot of every live collection matching `predicate`.
    pub fn collections_where(&self, predicate: impl Fn(&Collection) -> bool) -> Vec<Collection> {
        self.collections
            .iter()
            .filter(|row| !row.is_deleted() && predicate(row.value()))
            .map(|row| row.value().clone())
            .collect()
    }

    pub fn agent_exists(&self, id: Uuid) -> bool {
        self.agents.contains_key(&id)
    }

    /// Runs `f` inside a transaction on an existing, live collection row and
    /// returns its value together with the committed row.
    pub fn collection_tx<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut CollectionTx<'_>) -> Result<T, AppError>,
    ) -> Result<(T, Collection), AppError> {
        let mut row = self
            .collections
            .get_mut(&id)
            .filter(|row| !row.is_deleted())
            .ok_or_else(|| AppError::collection_not_found(id))?;

        let mut tx = CollectionTx::begin(self, row.value().clone());
        let value = f(&mut tx)?;
        let (staged, appended) = tx.finish()?;

        *row = staged.clone();
        for entry in appended {
            self.ledger.append(entry);
        }

        Ok((value, staged))
    }

    /// Inserts `collection` as a new row, running `f` in the same transaction.
    pub fn insert_collection<T>(
        &self,
        collection: Collection,
        f: impl FnOnce(&mut CollectionTx<'_>) -> Result<T, AppError>,
    ) -> Result<(T, Collection), AppError> {
        let Entry::Vacant(slot) = self.collections.entry(collection.id) else {
            return Err(AppError::Persistence(format!(
                "duplicate collection id {}",
                collection.id
            )));
        };

        let mut tx = CollectionTx::begin(self, collection);
        let value = f(&mut tx)?;
        let (staged, appended) = tx.finish()?;

        slot.insert(staged.clone());
        for entry in appended {
            self.ledger.append(entry);
        }

        Ok((value, staged))
    }

    /// Number of live collections.
    pub fn collection_count(&self) -> usize {
        self.collections.iter().filter(|row| !row.is_deleted()).count()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Staged view of one collection row plus the ledger entries it will append.
pub struct CollectionTx<'a> {
    store: &'a Store,
    row: Collection,
    appended: Vec<Assignment>,
    now: DateTime<Utc>,
}

impl<'a> CollectionTx<'a> {
    fn begin(store: &'a Store, row: Collection) -> Self {
        Self {
            store,
            row,
            appended: Vec::new(),
            now: Utc::now(),
        }
    }

    pub fn row(&self) -> &Collection {
        &self.row
    }

    pub fn row_mut(&mut self) -> &mut Collection {
        &mut self.row
    }

    /// Transaction timestamp; every stamp written by one transaction agrees.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn agent_exists(&self, agent_id: Uuid) -> bool {
        self.store.agent_exists(agent_id)
    }

    /// Most recent ledger entry for this collection, including staged ones.
    pub fn latest_assignment(&self) -> Option<Assignment> {
        self.appended
            .last()
            .cloned()
            .or_else(|| self.store.ledger.latest_for(self.row.id))
    }

    /// Points the collection at `agent_id` and stages the matching ledger entry.
    pub fn bind_agent(&mut self, agent_id: Uuid) -> Assignment {
        let entry = Assignment {
            id: Uuid::new_v4(),
            collection_id: self.row.id,
            agent_id,
            assigned_at: self.now,
            reassigned_from_id: self.latest_assignment().map(|prev| prev.id),
            sequence: self.store.ledger.reserve_sequence(),
        };

        self.row.assigned_agent_id = Some(agent_id);
        self.appended.push(entry.clone());
        entry
    }

    fn finish(mut self) -> Result<(Collection, Vec<Assignment>), AppError> {
        self.check_constraints()?;
        self.row.updated_at = self.now;
        Ok((self.row, self.appended))
    }

    fn check_constraints(&self) -> Result<(), AppError> {
        let row = &self.row;

        if row.status.requires_agent() && row.assigned_agent_id.is_none() {
            return Err(AppError::Persistence(format!(
                "collection {} cannot be {} without an assigned agent",
                row.id, row.status
            )));
        }

        if let Some(agent_id) = row.assigned_agent_id {
            let ledger_agent = self.latest_assignment().map(|entry| entry.agent_id);
            if ledger_agent != Some(agent_id) {
                return Err(AppError::Persistence(format!(
                    "collection {} points at agent {agent_id} but its ledger does not",
                    row.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::agent::{Agent, AgentStatus};
    use crate::models::collection::{CollectionStatus, CollectionType, NewCollection};

    fn collection() -> Collection {
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
        .into_collection(Utc::now())
    }

    fn agent(store: &Store) -> Uuid {
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
        store.agents.insert(id, agent);
        id
    }

    #[test]
    fn bind_agent_commits_pointer_and_ledger_together() {
        let store = Store::new();
        let agent_id = agent(&store);
        let row = collection();
        let id = row.id;
        store.insert_collection(row, |_| Ok(())).unwrap();

        let (entry, committed) = store
            .collection_tx(id, |tx| {
                let entry = tx.bind_agent(agent_id);
                tx.row_mut().status = CollectionStatus::Assigned;
                Ok(entry)
            })
            .unwrap();

        let stored = store.collection(id).unwrap();
        assert_eq!(stored.assigned_agent_id, Some(agent_id));
        assert_eq!(committed.updated_at, stored.updated_at);
        assert_eq!(store.ledger.latest_for(id), Some(entry));
    }

    #[test]
    fn closure_error_rolls_back_staged_changes() {
        let store = Store::new();
        let agent_id = agent(&store);
        let row = collection();
        let id = row.id;
        store.insert_collection(row, |_| Ok(())).unwrap();

        let result: Result<((), Collection), AppError> = store.collection_tx(id, |tx| {
            tx.bind_agent(agent_id);
            tx.row_mut().status = CollectionStatus::Assigned;
            Err(AppError::Conflict("changed my mind".to_string()))
        });

        assert!(matches!(result, Err(AppError::Conflict(_))));
        let stored = store.collection(id).unwrap();
        assert_eq!(stored.status, CollectionStatus::Pending);
        assert!(stored.assigned_agent_id.is_none());
        assert!(store.ledger.is_empty());
    }

    #[test]
    fn pointer_without_ledger_entry_is_rejected() {
        let store = Store::new();
        let row = collection();
        let id = row.id;
        store.insert_collection(row, |_| Ok(())).unwrap();

        let result = store.collection_tx(id, |tx| {
            tx.row_mut().assigned_agent_id = Some(Uuid::new_v4());
            tx.row_mut().status = CollectionStatus::Assigned;
            Ok(())
        });

        assert!(matches!(result, Err(AppError::Persistence(_))));
        assert!(store.collection(id).unwrap().assigned_agent_id.is_none());
    }

    #[test]
    fn assigned_status_without_agent_is_rejected() {
        let store = Store::new();
        let mut row = collection();
        row.status = CollectionStatus::Assigned;

        let result = store.insert_collection(row.clone(), |_| Ok(()));
        assert!(matches!(result, Err(AppError::Persistence(_))));
        assert!(store.collection(row.id).is_none());
    }

    #[test]
    fn soft_deleted_rows_are_invisible() {
        let store = Store::new();
        let row = collection();
        let id = row.id;
        store.insert_collection(row, |_| Ok(())).unwrap();

        store
            .collection_tx(id, |tx| {
                tx.row_mut().deleted_at = Some(tx.now());
                Ok(())
            })
            .unwrap();

        assert!(store.collection(id).is_none());
        assert_eq!(store.collection_count(), 0);
        assert!(matches!(
            store.collection_tx(id, |_| Ok(())),
            Err(AppError::NotFound(_))
        ));
    }
}
