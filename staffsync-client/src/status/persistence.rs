//! Status persistence boundary
//!
//! `load_all` seeds the in-memory store once at startup; `upsert` and
//! `remove` follow every state change the store actually makes.

use async_trait::async_trait;
use staffsync_common::models::StatusRecord;
use staffsync_common::{Error, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Durable home of status entries, namespaced by attribute
#[async_trait]
pub trait StatusPersistence: Send + Sync {
    async fn load_all(&self, attribute: &str) -> Result<Vec<StatusRecord>>;

    async fn upsert(&self, attribute: &str, record: &StatusRecord) -> Result<()>;

    async fn remove(&self, attribute: &str, entity: &str) -> Result<()>;
}

/// Process-memory persistence, for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryStatusPersistence {
    rows: Mutex<BTreeMap<(String, String), StatusRecord>>,
    unavailable: AtomicBool,
}

impl MemoryStatusPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a persistence error while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Row for one entity, if persisted
    pub async fn row(&self, attribute: &str, entity: &str) -> Option<StatusRecord> {
        self.rows
            .lock()
            .await
            .get(&(attribute.to_string(), entity.to_string()))
            .cloned()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::Persistence("status persistence unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StatusPersistence for MemoryStatusPersistence {
    async fn load_all(&self, attribute: &str) -> Result<Vec<StatusRecord>> {
        self.check_available()?;
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|((attr, _), _)| attr == attribute)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn upsert(&self, attribute: &str, record: &StatusRecord) -> Result<()> {
        self.check_available()?;
        self.rows
            .lock()
            .await
            .insert((attribute.to_string(), record.entity.clone()), record.clone());
        Ok(())
    }

    async fn remove(&self, attribute: &str, entity: &str) -> Result<()> {
        self.check_available()?;
        self.rows
            .lock()
            .await
            .remove(&(attribute.to_string(), entity.to_string()));
        Ok(())
    }
}
