//! Seed client for the backend's REST surface.
//!
//! The REST API is an opaque collaborator here: these calls only exist to
//! seed (and re-seed) the reconciled views before the feed takes over.

use anyhow::{Context, Result};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;
use uuid::Uuid;

use lib_livefeed::boards::SessionFilter;
use lib_livefeed::model::{ActivityLog, Employee, Screenshot, Session};

/// Wire shape of `GET /api/employees`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmployeeListResponse {
    employees: Vec<Employee>,
    #[serde(default)]
    #[allow(dead_code)]
    total_count: i64,
}

/// Asynchronous REST client with transient-failure retries.
#[derive(Clone)]
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid server URL '{base_url}'"))?;

        // Configure an exponential backoff policy with 3 retries
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let inner = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { inner, base_url })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("invalid API path '{path}'"))?;
        let response = self
            .inner
            .get(url.clone())
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("GET {url} returned an unexpected body"))
    }

    /// All sessions matching the filter; the caller orders them.
    pub async fn sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        let mut query = Vec::new();
        if let Some(user_id) = &filter.user_id {
            query.push(("userId", user_id.clone()));
        }
        if let Some(status) = filter.status {
            let value = serde_json::to_value(status)?;
            if let Some(status) = value.as_str() {
                query.push(("status", status.to_string()));
            }
        }
        self.get_json("/api/sessions", &query).await
    }

    pub async fn session(&self, session_id: &Uuid) -> Result<Session> {
        self.get_json(&format!("/api/sessions/{session_id}"), &[]).await
    }

    pub async fn employees(&self) -> Result<Vec<Employee>> {
        let list: EmployeeListResponse = self.get_json("/api/employees", &[]).await?;
        Ok(list.employees)
    }

    pub async fn activity_logs(&self, session_id: &Uuid) -> Result<Vec<ActivityLog>> {
        self.get_json(&format!("/api/activity/session/{session_id}"), &[])
            .await
    }

    pub async fn screenshots(&self, session_id: &Uuid) -> Result<Vec<Screenshot>> {
        self.get_json(&format!("/api/screenshots/session/{session_id}"), &[])
            .await
    }
}
