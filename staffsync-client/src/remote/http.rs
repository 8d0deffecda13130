//! HTTP client for the remote assignment store
//!
//! REST mapping:
//! - `POST   {base}/assignments`            create, responds `{"id": "..."}`
//! - `PATCH  {base}/assignments/{id}`       partial update
//! - `DELETE {base}/assignments/{id}`       delete
//! - `GET    {base}/assignments?person=..`  list by person
//! - `GET    {base}/assignments?project=..` list by project
//!
//! Timeouts are enforced here by the reqwest client; the cache above has none.

use super::AssignmentStore;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use staffsync_common::config::StoreConfig;
use staffsync_common::models::{Assignment, AssignmentId, AssignmentPatch, NewAssignment};
use staffsync_common::time::millis_to_duration;
use staffsync_common::{Error, Result};

const USER_AGENT: &str = concat!("staffsync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: AssignmentId,
}

/// Assignment store reached over HTTP
pub struct HttpAssignmentStore {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpAssignmentStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(millis_to_duration(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/assignments", self.base_url)
    }

    fn record_url(&self, id: &AssignmentId) -> String {
        format!("{}/assignments/{}", self.base_url, id)
    }

    async fn list(&self, filter: &str, key: &str) -> Result<Vec<Assignment>> {
        let url = self.collection_url();
        tracing::debug!(url = %url, filter = filter, key = key, "Listing assignments");

        let response = self
            .http_client
            .get(&url)
            .query(&[(filter, key)])
            .send()
            .await
            .map_err(transport)?;
        let response = check_status(response, key).await?;

        response
            .json::<Vec<Assignment>>()
            .await
            .map_err(|e| Error::Transport(format!("Malformed assignment list: {}", e)))
    }
}

#[async_trait]
impl AssignmentStore for HttpAssignmentStore {
    async fn create(&self, record: &NewAssignment) -> Result<AssignmentId> {
        let response = self
            .http_client
            .post(self.collection_url())
            .json(record)
            .send()
            .await
            .map_err(transport)?;
        let context = format!("{}/{}", record.person_key, record.project_key);
        let response = check_status(response, &context).await?;

        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("Malformed create response: {}", e)))?;
        Ok(created.id)
    }

    async fn update(&self, id: &AssignmentId, patch: &AssignmentPatch) -> Result<()> {
        let response = self
            .http_client
            .patch(self.record_url(id))
            .json(patch)
            .send()
            .await
            .map_err(transport)?;
        check_status(response, id.as_str()).await?;
        Ok(())
    }

    async fn remove(&self, id: &AssignmentId) -> Result<()> {
        let response = self
            .http_client
            .delete(self.record_url(id))
            .send()
            .await
            .map_err(transport)?;
        check_status(response, id.as_str()).await?;
        Ok(())
    }

    async fn list_by_person(&self, person_key: &str) -> Result<Vec<Assignment>> {
        self.list("person", person_key).await
    }

    async fn list_by_project(&self, project_key: &str) -> Result<Vec<Assignment>> {
        self.list("project", project_key).await
    }
}

fn transport(err: reqwest::Error) -> Error {
    Error::Transport(err.to_string())
}

async fn check_status(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(map_status(status, context, &body))
}

/// Translate a non-success HTTP status into the error taxonomy
fn map_status(status: StatusCode, context: &str, body: &str) -> Error {
    let detail = if body.is_empty() {
        context.to_string()
    } else {
        format!("{}: {}", context, body)
    };
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::Validation(detail),
        StatusCode::CONFLICT => Error::Conflict(detail),
        other => Error::Transport(format!("HTTP {}: {}", other.as_u16(), detail)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_trims_trailing_slash() {
        let config = StoreConfig {
            base_url: "http://localhost:9000/api/".to_string(),
            request_timeout_ms: 1000,
        };
        let store = HttpAssignmentStore::new(&config).unwrap();
        assert_eq!(store.collection_url(), "http://localhost:9000/api/assignments");
        assert_eq!(
            store.record_url(&AssignmentId::new("a-7")),
            "http://localhost:9000/api/assignments/a-7"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(map_status(StatusCode::NOT_FOUND, "a-1", ""), Error::NotFound(_)));
        assert!(matches!(
            map_status(StatusCode::UNPROCESSABLE_ENTITY, "a-1", "bad"),
            Error::Validation(_)
        ));
        assert!(matches!(map_status(StatusCode::CONFLICT, "a-1", ""), Error::Conflict(_)));
        assert!(matches!(
            map_status(StatusCode::SERVICE_UNAVAILABLE, "a-1", ""),
            Error::Transport(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_transport_error() {
        // Port 9 (discard) is not expected to serve HTTP
        let config = StoreConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_ms: 500,
        };
        let store = HttpAssignmentStore::new(&config).unwrap();
        let err = store.list_by_person("anna").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
