//! staffsync client library
//!
//! Client-side synchronization of person/project assignments with a remote
//! document store, plus the status resolution store and rule engine that
//! maintain derived per-person flags.
//!
//! - [`cache`]: dual-indexed assignment cache with fetch coalescing and
//!   optimistic link/update/unlink
//! - [`remote`]: the store boundary, an HTTP client and an in-memory store
//! - [`status`]: manual/rule/default precedence over one derived attribute
//! - [`rules`]: windowed evaluation of weekly utilization series

use staffsync_common::config::TomlConfig;
use staffsync_common::events::EventBus;
use staffsync_common::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub mod cache;
pub mod remote;
pub mod rules;
pub mod status;

use cache::AssignmentCache;
use remote::{AssignmentStore, HttpAssignmentStore};
use rules::RuleEngine;
use status::{SqliteStatusPersistence, StatusPersistence, StatusStore};

/// Cache over a type-erased store
pub type SharedCache = AssignmentCache<Arc<dyn AssignmentStore>>;

/// Everything one client session shares
#[derive(Clone)]
pub struct Session {
    pub config: TomlConfig,
    pub events: EventBus,
    pub cache: SharedCache,
    pub status: Arc<StatusStore>,
    pub rules: RuleEngine,
}

impl Session {
    /// Build a session against the configured HTTP store and SQLite database
    pub async fn open(config: TomlConfig) -> Result<Self> {
        let store: Arc<dyn AssignmentStore> = Arc::new(HttpAssignmentStore::new(&config.store)?);
        let persistence: Arc<dyn StatusPersistence> =
            Arc::new(SqliteStatusPersistence::open(&config.status.database_path).await?);
        info!(
            store = %config.store.base_url,
            database = %config.status.database_path.display(),
            "Session backends ready"
        );

        let session = Self::with_backends(config, store, persistence);
        session.seed_status().await;
        Ok(session)
    }

    /// Build a session over explicit backends
    pub fn with_backends(
        config: TomlConfig,
        store: Arc<dyn AssignmentStore>,
        persistence: Arc<dyn StatusPersistence>,
    ) -> Self {
        let events = EventBus::new(config.events.capacity);
        let cache = AssignmentCache::new(store, events.clone());
        let status = Arc::new(StatusStore::new(
            config.status.attribute.clone(),
            persistence,
            events.clone(),
        ));
        let rules = RuleEngine::new(config.rules.clone());

        Self {
            config,
            events,
            cache,
            status,
            rules,
        }
    }

    /// Load persisted status entries; a failure is retried by the next rule run
    pub async fn seed_status(&self) {
        if let Err(e) = self.status.load().await {
            warn!(error = %e, "Status entries not loaded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryAssignmentStore;
    use crate::status::MemoryStatusPersistence;
    use staffsync_common::models::{AssignmentMeta, NewAssignment};

    #[tokio::test]
    async fn test_session_shares_one_event_bus() {
        let store = Arc::new(MemoryAssignmentStore::new());
        store
            .seed(NewAssignment::from_meta("anna", "p1", AssignmentMeta::default()))
            .await;
        let session = Session::with_backends(
            TomlConfig::default(),
            store,
            Arc::new(MemoryStatusPersistence::new()),
        );
        let mut rx = session.events.subscribe();

        session.cache.get_for_person("anna", false).await.unwrap();
        session.status.set_manual("anna", true.into(), None).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().event_type(), "AssignmentsLoaded");
        assert_eq!(rx.recv().await.unwrap().event_type(), "StatusChanged");
    }

    #[tokio::test]
    async fn test_seed_status_tolerates_unavailable_persistence() {
        let persistence = Arc::new(MemoryStatusPersistence::new());
        persistence.set_unavailable(true);
        let session = Session::with_backends(
            TomlConfig::default(),
            Arc::new(MemoryAssignmentStore::new()),
            persistence,
        );

        session.seed_status().await;
        assert!(!session.status.is_seeded());
    }
}
