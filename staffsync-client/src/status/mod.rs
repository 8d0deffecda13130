//! Status resolution store
//!
//! Maps entity key to `{value, source}` for one derived attribute, with
//! three-tier precedence: manual beats rule beats default. Only
//! [`StatusStore::set_manual`] and [`StatusStore::clear_manual`] may move an
//! entity into or out of the manual state; rule and default merges skip
//! manual entries silently.
//!
//! The in-memory map is authoritative between persistence round trips:
//! every change lands in memory first, then is written through.

use serde::Serialize;
use staffsync_common::events::{EventBus, SyncEvent};
use staffsync_common::models::{StatusEntry, StatusRecord, StatusSource, StatusValue};
use staffsync_common::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub mod persistence;
pub mod sqlite;

pub use persistence::{MemoryStatusPersistence, StatusPersistence};
pub use sqlite::SqliteStatusPersistence;

/// Candidate produced by rule evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "value", rename_all = "lowercase")]
pub enum RuleUpdate {
    Set(StatusValue),
    /// Remove the entry outright rather than asserting a negative
    Clear,
}

/// What a conditional merge did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied,
    /// State already matched; nothing written
    Unchanged,
    /// Entity is manual; merge dropped
    SkippedManual,
    /// A rule entry exists; default merge dropped
    SkippedRule,
}

/// Status store for one derived attribute
pub struct StatusStore {
    attribute: String,
    entries: RwLock<HashMap<String, StatusEntry>>,
    persistence: Arc<dyn StatusPersistence>,
    seeded: AtomicBool,
    events: EventBus,
}

impl StatusStore {
    pub fn new(
        attribute: impl Into<String>,
        persistence: Arc<dyn StatusPersistence>,
        events: EventBus,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            entries: RwLock::new(HashMap::new()),
            persistence,
            seeded: AtomicBool::new(false),
            events,
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Seed memory from persistence, replacing whatever is held
    pub async fn load(&self) -> Result<usize> {
        let records = self.persistence.load_all(&self.attribute).await?;
        let count = records.len();
        let mut entries = self.entries.write().await;
        entries.clear();
        for record in records {
            entries.insert(
                record.entity,
                StatusEntry {
                    value: record.value,
                    source: record.source,
                    updated_by: record.updated_by,
                },
            );
        }
        self.seeded.store(true, Ordering::SeqCst);
        info!(attribute = %self.attribute, count, "Loaded status entries");
        Ok(count)
    }

    /// True once `load` has succeeded
    pub fn is_seeded(&self) -> bool {
        self.seeded.load(Ordering::SeqCst)
    }

    pub async fn get(&self, entity: &str) -> Option<StatusValue> {
        self.entries
            .read()
            .await
            .get(entity)
            .map(|e| e.value.clone())
    }

    /// Source of the current value; absent entries report `Default`
    pub async fn get_source(&self, entity: &str) -> StatusSource {
        self.entries
            .read()
            .await
            .get(entity)
            .map(|e| e.source)
            .unwrap_or(StatusSource::Default)
    }

    pub async fn entry(&self, entity: &str) -> Option<StatusEntry> {
        self.entries.read().await.get(entity).cloned()
    }

    /// Copy of every entry
    pub async fn snapshot(&self) -> HashMap<String, StatusEntry> {
        self.entries.read().await.clone()
    }

    /// Set a manual value unconditionally
    pub async fn set_manual(
        &self,
        entity: &str,
        value: StatusValue,
        updated_by: Option<&str>,
    ) -> Result<()> {
        let entry = StatusEntry {
            value,
            source: StatusSource::Manual,
            updated_by: updated_by.map(str::to_string),
        };
        self.entries
            .write()
            .await
            .insert(entity.to_string(), entry.clone());
        info!(entity, value = %entry.value, "Manual status set");
        self.write_through(entity, Some(entry)).await
    }

    /// Drop a manual value so rule or default values may apply again
    ///
    /// Returns false when the entity was not manual; nothing changes then.
    pub async fn clear_manual(&self, entity: &str) -> Result<bool> {
        {
            let mut entries = self.entries.write().await;
            match entries.get(entity) {
                Some(e) if e.source == StatusSource::Manual => {
                    entries.remove(entity);
                }
                _ => return Ok(false),
            }
        }
        info!(entity, "Manual status cleared");
        self.write_through(entity, None).await?;
        Ok(true)
    }

    /// Merge a rule candidate unless the entity is manual
    pub async fn merge_rule(&self, entity: &str, update: RuleUpdate) -> Result<MergeOutcome> {
        let change = {
            let mut entries = self.entries.write().await;
            let current = entries.get(entity);
            if current.map(|e| e.source) == Some(StatusSource::Manual) {
                debug!(entity, "Rule merge skipped, entity is manual");
                return Ok(MergeOutcome::SkippedManual);
            }
            match update {
                RuleUpdate::Set(value) => {
                    if current.is_some_and(|e| e.source == StatusSource::Rule && e.value == value) {
                        return Ok(MergeOutcome::Unchanged);
                    }
                    let entry = StatusEntry {
                        value,
                        source: StatusSource::Rule,
                        updated_by: None,
                    };
                    entries.insert(entity.to_string(), entry.clone());
                    Some(entry)
                }
                RuleUpdate::Clear => {
                    if entries.remove(entity).is_none() {
                        return Ok(MergeOutcome::Unchanged);
                    }
                    None
                }
            }
        };

        self.write_through(entity, change).await?;
        Ok(MergeOutcome::Applied)
    }

    /// Set a default value only where nothing but a default exists
    pub async fn merge_default(&self, entity: &str, value: StatusValue) -> Result<MergeOutcome> {
        let entry = {
            let mut entries = self.entries.write().await;
            match entries.get(entity) {
                Some(e) if e.source == StatusSource::Manual => return Ok(MergeOutcome::SkippedManual),
                Some(e) if e.source == StatusSource::Rule => return Ok(MergeOutcome::SkippedRule),
                Some(e) if e.value == value => return Ok(MergeOutcome::Unchanged),
                _ => {}
            }
            let entry = StatusEntry {
                value,
                source: StatusSource::Default,
                updated_by: None,
            };
            entries.insert(entity.to_string(), entry.clone());
            entry
        };

        self.write_through(entity, Some(entry)).await?;
        Ok(MergeOutcome::Applied)
    }

    /// Persist a change already applied in memory and announce it
    async fn write_through(&self, entity: &str, entry: Option<StatusEntry>) -> Result<()> {
        let (value, source) = match &entry {
            Some(e) => (Some(e.value.clone()), e.source),
            None => (None, StatusSource::Default),
        };

        let persisted = match entry {
            Some(e) => {
                let record = StatusRecord {
                    entity: entity.to_string(),
                    value: e.value,
                    source: e.source,
                    updated_by: e.updated_by,
                };
                self.persistence.upsert(&self.attribute, &record).await
            }
            None => self.persistence.remove(&self.attribute, entity).await,
        };
        if let Err(e) = &persisted {
            warn!(entity, error = %e, "Status change kept in memory but not persisted");
        }

        self.events.emit_lossy(SyncEvent::StatusChanged {
            entity: entity.to_string(),
            value,
            source,
            timestamp: chrono::Utc::now(),
        });
        persisted
    }
}
