//! Remote assignment store boundary
//!
//! The cache talks to the document store only through [`AssignmentStore`].
//! Every call is request/response; any failure comes back as a
//! [`staffsync_common::Error`] that the cache rethrows after its own recovery.

use async_trait::async_trait;
use staffsync_common::models::{Assignment, AssignmentId, AssignmentPatch, NewAssignment};
use staffsync_common::Result;
use std::sync::Arc;

pub mod http;
pub mod memory;

pub use http::HttpAssignmentStore;
pub use memory::MemoryAssignmentStore;

/// CRUD over assignment records, queryable by person or project
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Create a record and return its server-assigned id
    async fn create(&self, record: &NewAssignment) -> Result<AssignmentId>;

    /// Apply a partial update
    async fn update(&self, id: &AssignmentId, patch: &AssignmentPatch) -> Result<()>;

    /// Delete a record
    async fn remove(&self, id: &AssignmentId) -> Result<()>;

    /// All assignments owned by a person
    async fn list_by_person(&self, person_key: &str) -> Result<Vec<Assignment>>;

    /// All assignments owned by a project
    async fn list_by_project(&self, project_key: &str) -> Result<Vec<Assignment>>;
}

#[async_trait]
impl<S: AssignmentStore + ?Sized> AssignmentStore for Arc<S> {
    async fn create(&self, record: &NewAssignment) -> Result<AssignmentId> {
        (**self).create(record).await
    }

    async fn update(&self, id: &AssignmentId, patch: &AssignmentPatch) -> Result<()> {
        (**self).update(id, patch).await
    }

    async fn remove(&self, id: &AssignmentId) -> Result<()> {
        (**self).remove(id).await
    }

    async fn list_by_person(&self, person_key: &str) -> Result<Vec<Assignment>> {
        (**self).list_by_person(person_key).await
    }

    async fn list_by_project(&self, project_key: &str) -> Result<Vec<Assignment>> {
        (**self).list_by_project(project_key).await
    }
}
