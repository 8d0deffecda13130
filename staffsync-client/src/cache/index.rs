//! Dual index over assignments
//!
//! One logical record set kept under two lookup keys. Every mutation goes
//! through [`DualIndex::apply`], which always updates both maps, so no
//! caller can touch one side without the other.

use staffsync_common::models::{Assignment, AssignmentId, AssignmentPatch};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Lookup key into one side of the dual index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Person(String),
    Project(String),
}

impl IndexKey {
    pub fn person(key: &str) -> Self {
        IndexKey::Person(key.to_string())
    }

    pub fn project(key: &str) -> Self {
        IndexKey::Project(key.to_string())
    }

    /// Key under which `record` belongs on the same side as `self`
    fn owner_of(&self, record: &Assignment) -> IndexKey {
        match self {
            IndexKey::Person(_) => IndexKey::Person(record.person_key.clone()),
            IndexKey::Project(_) => IndexKey::Project(record.project_key.clone()),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Person(k) => write!(f, "person:{}", k),
            IndexKey::Project(k) => write!(f, "project:{}", k),
        }
    }
}

/// A change to the dual index
#[derive(Debug, Clone)]
pub(crate) enum Change {
    /// Authoritative list for one key, as returned by a fetch
    Replace { key: IndexKey, records: Vec<Assignment> },
    /// Insert, or replace by id, under both owning keys
    Upsert(Assignment),
    /// Insert the confirmed record, then drop the provisional one
    Confirm { provisional: AssignmentId, record: Assignment },
    /// Remove by id from every list on both sides
    Remove(AssignmentId),
    /// Patch every copy of a record
    Patch {
        id: AssignmentId,
        patch: AssignmentPatch,
        updated_at: DateTime<Utc>,
    },
}

/// Keys whose lists held the affected record before the change
#[derive(Debug, Default)]
pub(crate) struct Applied {
    pub touched: Vec<IndexKey>,
}

/// Mirror invariant violation found by [`DualIndex::check_mirror`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorViolation {
    pub id: AssignmentId,
    pub found_under: IndexKey,
    pub detail: String,
}

impl fmt::Display for MirrorViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} under {}: {}", self.id, self.found_under, self.detail)
    }
}

impl std::error::Error for MirrorViolation {}

#[derive(Debug, Default)]
pub(crate) struct DualIndex {
    by_person: HashMap<String, Vec<Assignment>>,
    by_project: HashMap<String, Vec<Assignment>>,
    /// Keys fetched at least once; their list stays present even when empty
    loaded: HashSet<IndexKey>,
}

impl DualIndex {
    pub fn apply(&mut self, change: Change) -> Applied {
        match change {
            Change::Replace { key, records } => {
                self.replace(&key, records);
                Applied::default()
            }
            Change::Upsert(record) => {
                self.upsert(record);
                Applied::default()
            }
            Change::Confirm { provisional, record } => {
                self.upsert(record);
                self.remove(&provisional)
            }
            Change::Remove(id) => self.remove(&id),
            Change::Patch {
                id,
                patch,
                updated_at,
            } => self.patch(&id, &patch, updated_at),
        }
    }

    pub fn get(&self, key: &IndexKey) -> Option<&Vec<Assignment>> {
        match key {
            IndexKey::Person(k) => self.by_person.get(k),
            IndexKey::Project(k) => self.by_project.get(k),
        }
    }

    /// Linear scan of both sides; per-key lists are small
    pub fn find(&self, id: &AssignmentId) -> Option<&Assignment> {
        self.by_person
            .values()
            .chain(self.by_project.values())
            .flatten()
            .find(|a| &a.id == id)
    }

    /// Cached non-closed assignment linking the pair, if any
    pub fn find_open_link(&self, person_key: &str, project_key: &str) -> Option<&Assignment> {
        let by_person = self.by_person.get(person_key).into_iter().flatten();
        let by_project = self.by_project.get(project_key).into_iter().flatten();
        by_person
            .chain(by_project)
            .find(|a| a.is_open() && a.links(person_key, project_key))
    }

    /// Verify that every record has a field-identical copy under its mirror key
    pub fn check_mirror(&self) -> Result<(), MirrorViolation> {
        for (key, list) in &self.by_person {
            for a in list {
                if &a.person_key != key {
                    return Err(violation(a, IndexKey::person(key), "listed under foreign person key"));
                }
                let mirror = self.by_project.get(&a.project_key).into_iter().flatten();
                check_copy(a, mirror, IndexKey::person(key))?;
            }
        }
        for (key, list) in &self.by_project {
            for a in list {
                if &a.project_key != key {
                    return Err(violation(a, IndexKey::project(key), "listed under foreign project key"));
                }
                let mirror = self.by_person.get(&a.person_key).into_iter().flatten();
                check_copy(a, mirror, IndexKey::project(key))?;
            }
        }
        Ok(())
    }

    fn list_mut(&mut self, key: &IndexKey) -> &mut Vec<Assignment> {
        match key {
            IndexKey::Person(k) => self.by_person.entry(k.clone()).or_default(),
            IndexKey::Project(k) => self.by_project.entry(k.clone()).or_default(),
        }
    }

    fn replace(&mut self, key: &IndexKey, records: Vec<Assignment>) {
        let previous = match key {
            IndexKey::Person(k) => self.by_person.remove(k),
            IndexKey::Project(k) => self.by_project.remove(k),
        }
        .unwrap_or_default();

        // Records the store no longer lists under this key leave both sides,
        // except provisional ones whose create has not settled yet.
        let (pending, stale): (Vec<_>, Vec<_>) = previous
            .into_iter()
            .filter(|old| !records.iter().any(|r| r.id == old.id))
            .partition(|old| old.id.is_provisional());
        for old in &stale {
            self.remove(&old.id);
        }

        self.loaded.insert(key.clone());
        self.list_mut(key);
        for record in records {
            if key.owner_of(&record) != *key {
                tracing::warn!(key = %key, id = %record.id, "Fetched record belongs to another key");
            }
            self.upsert(record);
        }
        for record in pending {
            self.upsert(record);
        }
    }

    fn upsert(&mut self, record: Assignment) {
        let person = IndexKey::Person(record.person_key.clone());
        let project = IndexKey::Project(record.project_key.clone());

        // A record that moved owner must not linger under its old keys.
        self.retain_where(|key, a| {
            a.id != record.id || *key == person || *key == project
        });

        upsert_into(self.list_mut(&person), record.clone());
        upsert_into(self.list_mut(&project), record);
    }

    fn remove(&mut self, id: &AssignmentId) -> Applied {
        let mut touched = Vec::new();
        self.retain_where(|key, a| {
            if &a.id == id {
                touched.push(key.clone());
                false
            } else {
                true
            }
        });
        Applied { touched }
    }

    fn patch(
        &mut self,
        id: &AssignmentId,
        patch: &AssignmentPatch,
        updated_at: DateTime<Utc>,
    ) -> Applied {
        let mut touched = Vec::new();
        for (key, list) in self.by_person.iter_mut() {
            for a in list.iter_mut().filter(|a| &a.id == id) {
                a.apply_patch(patch, updated_at);
                touched.push(IndexKey::person(key));
            }
        }
        for (key, list) in self.by_project.iter_mut() {
            for a in list.iter_mut().filter(|a| &a.id == id) {
                a.apply_patch(patch, updated_at);
                touched.push(IndexKey::project(key));
            }
        }
        Applied { touched }
    }

    /// Keep only the records for which `keep` holds, dropping emptied lists
    /// that were never fetched
    fn retain_where(&mut self, mut keep: impl FnMut(&IndexKey, &Assignment) -> bool) {
        let loaded = &self.loaded;
        for (side, map) in [(true, &mut self.by_person), (false, &mut self.by_project)] {
            map.retain(|k, list| {
                let key = if side {
                    IndexKey::person(k)
                } else {
                    IndexKey::project(k)
                };
                list.retain(|a| keep(&key, a));
                !list.is_empty() || loaded.contains(&key)
            });
        }
    }
}

fn upsert_into(list: &mut Vec<Assignment>, record: Assignment) {
    match list.iter_mut().find(|a| a.id == record.id) {
        Some(slot) => *slot = record,
        None => list.push(record),
    }
}

fn check_copy<'a>(
    record: &Assignment,
    mut mirror: impl Iterator<Item = &'a Assignment>,
    found_under: IndexKey,
) -> Result<(), MirrorViolation> {
    match mirror.find(|m| m.id == record.id) {
        Some(m) if m == record => Ok(()),
        Some(_) => Err(violation(record, found_under, "mirror copy differs")),
        None => Err(violation(record, found_under, "missing from mirror index")),
    }
}

fn violation(record: &Assignment, found_under: IndexKey, detail: &str) -> MirrorViolation {
    MirrorViolation {
        id: record.id.clone(),
        found_under,
        detail: detail.to_string(),
    }
}
