//! In-memory assignment store
//!
//! Behaves like the remote document store: assigns ids, denormalizes
//! project names into listed records, validates payloads. Tests can also
//! inject failures, count calls per operation, and hold an operation at a
//! gate to observe the cache while a request is outstanding.

use super::AssignmentStore;
use async_trait::async_trait;
use chrono::Utc;
use staffsync_common::models::{Assignment, AssignmentId, AssignmentPatch, NewAssignment};
use staffsync_common::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, Notify};

/// Store operations, for failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Remove,
    ListByPerson,
    ListByProject,
}

/// Releases calls held at a gate
#[derive(Debug, Clone)]
pub struct GateHandle {
    notify: Arc<Notify>,
}

impl GateHandle {
    /// Let one held (or the next) call through
    pub fn release_one(&self) {
        self.notify.notify_one();
    }
}

#[derive(Default)]
struct Instrumentation {
    calls: HashMap<Operation, usize>,
    keyed_calls: HashMap<(Operation, String), usize>,
    waiting: HashMap<Operation, usize>,
    failures: HashMap<Operation, VecDeque<Error>>,
    gates: HashMap<Operation, Arc<Notify>>,
}

/// Assignment store held in process memory
#[derive(Default)]
pub struct MemoryAssignmentStore {
    records: Mutex<Vec<Assignment>>,
    project_names: StdMutex<HashMap<String, String>>,
    next_id: AtomicU64,
    enforce_unique_open: bool,
    instrumentation: StdMutex<Instrumentation>,
}

impl MemoryAssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject duplicate non-closed links server-side with `Conflict`
    pub fn with_unique_open_links(mut self) -> Self {
        self.enforce_unique_open = true;
        self
    }

    /// Register the display name joined into listed records
    pub fn with_project_name(self, project_key: &str, name: &str) -> Self {
        self.lock_names()
            .insert(project_key.to_string(), name.to_string());
        self
    }

    /// Seed a record as if it had been created earlier
    pub async fn seed(&self, record: NewAssignment) -> AssignmentId {
        let id = self.allocate_id();
        let now = Utc::now();
        self.records.lock().await.push(record.into_record(id.clone(), now));
        id
    }

    /// Make the next call of `op` fail with `err`
    pub fn fail_next(&self, op: Operation, err: Error) {
        self.lock_instrumentation()
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Hold every call of `op` until released through the returned handle
    pub fn hold(&self, op: Operation) -> GateHandle {
        let notify = Arc::new(Notify::new());
        self.lock_instrumentation()
            .gates
            .insert(op, Arc::clone(&notify));
        GateHandle { notify }
    }

    /// Stop holding calls of `op`; calls already waiting still need a release
    pub fn open(&self, op: Operation) {
        self.lock_instrumentation().gates.remove(&op);
    }

    /// Number of calls of `op` issued so far
    pub fn calls(&self, op: Operation) -> usize {
        self.lock_instrumentation()
            .calls
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Number of calls of `op` issued for a given key (person, project or id)
    pub fn calls_for(&self, op: Operation, key: &str) -> usize {
        self.lock_instrumentation()
            .keyed_calls
            .get(&(op, key.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of calls of `op` currently held at its gate
    pub fn waiting(&self, op: Operation) -> usize {
        self.lock_instrumentation()
            .waiting
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of every stored record
    pub async fn records(&self) -> Vec<Assignment> {
        self.records.lock().await.clone()
    }

    fn allocate_id(&self) -> AssignmentId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        AssignmentId::new(format!("a-{}", n))
    }

    fn lock_instrumentation(&self) -> std::sync::MutexGuard<'_, Instrumentation> {
        self.instrumentation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_names(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.project_names
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call, wait at the gate if one is set, then pop any injected failure
    async fn enter(&self, op: Operation, key: &str) -> Result<()> {
        let gate = {
            let mut inst = self.lock_instrumentation();
            *inst.calls.entry(op).or_default() += 1;
            *inst.keyed_calls.entry((op, key.to_string())).or_default() += 1;
            let gate = inst.gates.get(&op).cloned();
            if gate.is_some() {
                *inst.waiting.entry(op).or_default() += 1;
            }
            gate
        };

        if let Some(gate) = gate {
            gate.notified().await;
            let mut inst = self.lock_instrumentation();
            if let Some(n) = inst.waiting.get_mut(&op) {
                *n = n.saturating_sub(1);
            }
        }

        let injected = self
            .lock_instrumentation()
            .failures
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        match injected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn denormalize(&self, mut record: Assignment) -> Assignment {
        record.project_name = self.lock_names().get(&record.project_key).cloned();
        record
    }
}

#[async_trait]
impl AssignmentStore for MemoryAssignmentStore {
    async fn create(&self, record: &NewAssignment) -> Result<AssignmentId> {
        let key = format!("{}/{}", record.person_key, record.project_key);
        self.enter(Operation::Create, &key).await?;
        record.validate()?;

        let mut records = self.records.lock().await;
        if self.enforce_unique_open
            && records
                .iter()
                .any(|r| r.is_open() && r.links(&record.person_key, &record.project_key))
        {
            return Err(Error::Conflict(format!("open assignment already exists for {}", key)));
        }

        let id = self.allocate_id();
        records.push(record.clone().into_record(id.clone(), Utc::now()));
        Ok(id)
    }

    async fn update(&self, id: &AssignmentId, patch: &AssignmentPatch) -> Result<()> {
        self.enter(Operation::Update, id.as_str()).await?;

        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        patch.validate_against(Some(&*record))?;
        record.apply_patch(patch, Utc::now());
        Ok(())
    }

    async fn remove(&self, id: &AssignmentId) -> Result<()> {
        self.enter(Operation::Remove, id.as_str()).await?;

        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|r| &r.id != id);
        if records.len() == before {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_by_person(&self, person_key: &str) -> Result<Vec<Assignment>> {
        self.enter(Operation::ListByPerson, person_key).await?;

        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|r| r.person_key == person_key)
            .cloned()
            .map(|r| self.denormalize(r))
            .collect())
    }

    async fn list_by_project(&self, project_key: &str) -> Result<Vec<Assignment>> {
        self.enter(Operation::ListByProject, project_key).await?;

        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|r| r.project_key == project_key)
            .cloned()
            .map(|r| self.denormalize(r))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staffsync_common::models::{AssignmentMeta, AssignmentStatus};

    fn payload(person: &str, project: &str) -> NewAssignment {
        NewAssignment::from_meta(person, project, AssignmentMeta::default())
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let store = MemoryAssignmentStore::new();
        let a = store.create(&payload("anna", "p1")).await.unwrap();
        let b = store.create(&payload("anna", "p2")).await.unwrap();
        assert_eq!(a.as_str(), "a-1");
        assert_eq!(b.as_str(), "a-2");
        assert_eq!(store.calls(Operation::Create), 2);
    }

    #[tokio::test]
    async fn test_list_joins_project_name() {
        let store = MemoryAssignmentStore::new().with_project_name("p1", "Apollo");
        store.create(&payload("anna", "p1")).await.unwrap();
        let listed = store.list_by_person("anna").await.unwrap();
        assert_eq!(listed[0].project_name.as_deref(), Some("Apollo"));
        assert_eq!(store.calls_for(Operation::ListByPerson, "anna"), 1);
    }

    #[tokio::test]
    async fn test_unique_open_links_conflict() {
        let store = MemoryAssignmentStore::new().with_unique_open_links();
        store.create(&payload("anna", "p1")).await.unwrap();
        let err = store.create(&payload("anna", "p1")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_and_remove_unknown_id_not_found() {
        let store = MemoryAssignmentStore::new();
        let missing = AssignmentId::new("a-404");
        let patch = AssignmentPatch::status(AssignmentStatus::Closed);
        assert!(matches!(store.update(&missing, &patch).await, Err(Error::NotFound(_))));
        assert!(matches!(store.remove(&missing).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let store = MemoryAssignmentStore::new();
        store.fail_next(Operation::ListByProject, Error::Transport("offline".into()));
        assert!(store.list_by_project("p1").await.is_err());
        assert!(store.list_by_project("p1").await.is_ok());
    }

    #[tokio::test]
    async fn test_gate_holds_until_released() {
        let store = Arc::new(MemoryAssignmentStore::new());
        let gate = store.hold(Operation::Create);

        let new_assignment = payload("anna", "p1");
        let (created, ()) = tokio::join!(store.create(&new_assignment), async {
            while store.waiting(Operation::Create) == 0 {
                tokio::task::yield_now().await;
            }
            assert!(store.records().await.is_empty());
            gate.release_one();
        });

        assert!(created.is_ok());
        assert_eq!(store.records().await.len(), 1);
    }
}
