//! Mutation pipeline: link, update, unlink
//!
//! Each mutation applies its expected effect to the dual index before the
//! remote call, then reconciles:
//! - `link` confirms (provisional id replaced by the server id) or rolls back
//! - `update` commits, or force-refreshes the keys that held the record
//! - `unlink` commits, or force-refreshes the keys that held the record
//!
//! Nothing here retries, and nothing branches on the error kind.

use super::{AssignmentCache, Change, IndexKey};
use crate::remote::AssignmentStore;
use staffsync_common::events::SyncEvent;
use staffsync_common::models::{AssignmentId, AssignmentMeta, AssignmentPatch, NewAssignment};
use staffsync_common::time::now;
use staffsync_common::{Error, Result};
use tracing::{debug, info, warn};

/// Result of a successful `link`
///
/// A provisional link moves `Pending(temp_id) -> Committed(id)`; a rollback
/// surfaces as `Err` from `link` and a `LinkRolledBack` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// A non-closed link for the pair was already cached; nothing was created
    Existing(AssignmentId),
    /// The store created the record
    Committed {
        temp_id: AssignmentId,
        id: AssignmentId,
    },
}

impl LinkOutcome {
    /// Id of the resulting assignment
    pub fn id(&self) -> &AssignmentId {
        match self {
            LinkOutcome::Existing(id) => id,
            LinkOutcome::Committed { id, .. } => id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, LinkOutcome::Committed { .. })
    }
}

impl<S: AssignmentStore + 'static> AssignmentCache<S> {
    /// Link a person to a project
    ///
    /// Returns the cached link unchanged when a non-closed one exists for the
    /// pair. The guard is local to this cache; the store may still hold
    /// duplicates written by other clients.
    pub async fn link(
        &self,
        person_key: &str,
        project_key: &str,
        meta: AssignmentMeta,
    ) -> Result<LinkOutcome> {
        let payload = NewAssignment::from_meta(person_key, project_key, meta);
        payload.validate()?;

        let temp_id = AssignmentId::provisional();
        {
            let mut index = self.inner.index.write().await;
            if let Some(existing) = index.find_open_link(person_key, project_key) {
                debug!(
                    person = person_key,
                    project = project_key,
                    id = %existing.id,
                    "Open link already cached"
                );
                return Ok(LinkOutcome::Existing(existing.id.clone()));
            }
            index.apply(Change::Upsert(
                payload.clone().into_record(temp_id.clone(), now()),
            ));
        }
        self.events().emit_lossy(SyncEvent::LinkPending {
            temp_id: temp_id.clone(),
            person_key: person_key.to_string(),
            project_key: project_key.to_string(),
            timestamp: now(),
        });

        let id = match self.store().create(&payload).await {
            Ok(id) => id,
            Err(err) => {
                self.apply(Change::Remove(temp_id.clone())).await;
                warn!(
                    person = person_key,
                    project = project_key,
                    error = %err,
                    "Link failed, optimistic entry rolled back"
                );
                self.events().emit_lossy(SyncEvent::LinkRolledBack {
                    temp_id,
                    reason: err.to_string(),
                    timestamp: now(),
                });
                return Err(err);
            }
        };

        self.apply(Change::Confirm {
            provisional: temp_id.clone(),
            record: payload.into_record(id.clone(), now()),
        })
        .await;
        info!(person = person_key, project = project_key, id = %id, "Link committed");
        self.events().emit_lossy(SyncEvent::LinkCommitted {
            temp_id: temp_id.clone(),
            id: id.clone(),
            timestamp: now(),
        });

        // Pick up server-side denormalized fields the payload could not know.
        if let Err(e) = self.refresh(IndexKey::person(person_key)).await {
            warn!(person = person_key, error = %e, "Refresh after link failed");
        }

        Ok(LinkOutcome::Committed { temp_id, id })
    }

    /// Patch an assignment
    ///
    /// On failure the local patch is not inverted; the keys that held the
    /// record are re-fetched instead and the error is returned.
    pub async fn update(&self, id: &AssignmentId, patch: AssignmentPatch) -> Result<()> {
        if id.is_provisional() {
            return Err(Error::Validation(format!("{} is still pending creation", id)));
        }
        if patch.is_empty() {
            debug!(id = %id, "Empty patch, nothing to update");
            return Ok(());
        }

        let updated_at = now();
        let touched = {
            let mut index = self.inner.index.write().await;
            patch.validate_against(index.find(id))?;
            index
                .apply(Change::Patch {
                    id: id.clone(),
                    patch: patch.clone(),
                    updated_at,
                })
                .touched
        };

        match self.store().update(id, &patch).await {
            Ok(()) => {
                info!(id = %id, "Update committed");
                self.events().emit_lossy(SyncEvent::AssignmentUpdated {
                    id: id.clone(),
                    timestamp: now(),
                });
                Ok(())
            }
            Err(err) => {
                warn!(id = %id, error = %err, "Update failed, re-fetching affected keys");
                self.refresh_all(touched).await;
                Err(err)
            }
        }
    }

    /// Remove an assignment from every cached list, then from the store
    ///
    /// On failure the keys that held the record are re-fetched and the error
    /// is returned; the removed record is not reinserted from memory.
    pub async fn unlink(&self, id: &AssignmentId) -> Result<()> {
        if id.is_provisional() {
            return Err(Error::Validation(format!("{} is still pending creation", id)));
        }

        let touched = self.apply(Change::Remove(id.clone())).await.touched;

        match self.store().remove(id).await {
            Ok(()) => {
                info!(id = %id, "Unlink committed");
                self.events().emit_lossy(SyncEvent::AssignmentUnlinked {
                    id: id.clone(),
                    timestamp: now(),
                });
                Ok(())
            }
            Err(err) => {
                warn!(id = %id, error = %err, "Unlink failed, re-fetching affected keys");
                self.refresh_all(touched).await;
                Err(err)
            }
        }
    }
}
