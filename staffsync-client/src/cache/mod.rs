//! Assignment cache manager
//!
//! Owns the dual index (by person, by project) and the per-key in-flight
//! fetch table. Reads are served from the index whenever a list is present
//! for the key, including lists created by mirroring or by an optimistic
//! insert; otherwise one fetch per key is issued and every concurrent caller
//! for that key awaits the same shared result.
//!
//! The cache is a cheap-to-clone handle. Construct one per session and pass
//! it to whatever needs it.

use crate::remote::AssignmentStore;
use futures::future::{BoxFuture, FutureExt, Shared};
use staffsync_common::events::{EventBus, SyncEvent};
use staffsync_common::models::{Assignment, AssignmentId};
use staffsync_common::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

mod index;
mod mutations;

pub use index::{IndexKey, MirrorViolation};
pub use mutations::LinkOutcome;

use index::{Applied, Change, DualIndex};

type SharedFetch = Shared<BoxFuture<'static, Result<Vec<Assignment>>>>;

struct Inner<S> {
    store: S,
    index: RwLock<DualIndex>,
    in_flight: Mutex<HashMap<IndexKey, SharedFetch>>,
    events: EventBus,
}

/// Read-through cache of assignments with optimistic mutations
pub struct AssignmentCache<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for AssignmentCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: AssignmentStore + 'static> AssignmentCache<S> {
    pub fn new(store: S, events: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                index: RwLock::new(DualIndex::default()),
                in_flight: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Assignments of a person; fetched unless cached or when `force` is set
    pub async fn get_for_person(&self, person_key: &str, force: bool) -> Result<Vec<Assignment>> {
        self.get(IndexKey::person(person_key), force).await
    }

    /// Assignments of a project; fetched unless cached or when `force` is set
    pub async fn get_for_project(&self, project_key: &str, force: bool) -> Result<Vec<Assignment>> {
        self.get(IndexKey::project(project_key), force).await
    }

    /// Force-fetch one key
    pub async fn refresh(&self, key: IndexKey) -> Result<Vec<Assignment>> {
        self.get(key, true).await
    }

    /// Read one key, coalescing with any fetch already outstanding for it
    pub async fn get(&self, key: IndexKey, force: bool) -> Result<Vec<Assignment>> {
        if !force {
            if let Some(list) = self.inner.index.read().await.get(&key) {
                debug!(key = %key, count = list.len(), "Cache hit");
                return Ok(list.clone());
            }
        }

        let fetch = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(pending) => {
                    debug!(key = %key, "Joining outstanding fetch");
                    pending.clone()
                }
                None => {
                    let fetch = Self::start_fetch(Arc::clone(&self.inner), key.clone());
                    in_flight.insert(key, fetch.clone());
                    fetch
                }
            }
        };

        fetch.await
    }

    /// True while a fetch for `key` is outstanding
    pub async fn is_loading(&self, key: &IndexKey) -> bool {
        self.inner.in_flight.lock().await.contains_key(key)
    }

    /// Cached list for a key without any remote call
    pub async fn cached(&self, key: &IndexKey) -> Option<Vec<Assignment>> {
        self.inner.index.read().await.get(key).cloned()
    }

    pub async fn cached_for_person(&self, person_key: &str) -> Option<Vec<Assignment>> {
        self.cached(&IndexKey::person(person_key)).await
    }

    pub async fn cached_for_project(&self, project_key: &str) -> Option<Vec<Assignment>> {
        self.cached(&IndexKey::project(project_key)).await
    }

    /// Cached record by id, from either side
    pub async fn find(&self, id: &AssignmentId) -> Option<Assignment> {
        self.inner.index.read().await.find(id).cloned()
    }

    /// Verify the mirror invariant over the whole cache
    pub async fn check_mirror(&self) -> std::result::Result<(), MirrorViolation> {
        self.inner.index.read().await.check_mirror()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub(crate) fn store(&self) -> &S {
        &self.inner.store
    }

    /// Apply one change to both sides under a single write lock
    async fn apply(&self, change: Change) -> Applied {
        self.inner.index.write().await.apply(change)
    }

    /// Force-refresh every key, logging failures instead of returning them
    async fn refresh_all(&self, keys: Vec<IndexKey>) {
        for key in keys {
            if let Err(e) = self.refresh(key.clone()).await {
                warn!(key = %key, error = %e, "Refresh after failed mutation also failed");
            }
        }
    }

    fn start_fetch(inner: Arc<Inner<S>>, key: IndexKey) -> SharedFetch {
        async move {
            let result = match &key {
                IndexKey::Person(k) => inner.store.list_by_person(k).await,
                IndexKey::Project(k) => inner.store.list_by_project(k).await,
            };

            match &result {
                Ok(records) => {
                    inner.index.write().await.apply(Change::Replace {
                        key: key.clone(),
                        records: records.clone(),
                    });
                    info!(key = %key, count = records.len(), "Loaded assignments");
                    inner.events.emit_lossy(SyncEvent::AssignmentsLoaded {
                        key: key.to_string(),
                        count: records.len(),
                        timestamp: chrono::Utc::now(),
                    });
                }
                Err(e) => warn!(key = %key, error = %e, "Assignment fetch failed"),
            }

            inner.in_flight.lock().await.remove(&key);
            result
        }
        .boxed()
        .shared()
    }
}
