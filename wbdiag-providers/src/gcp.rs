use crate::{service_endpoint, ApiClientFactory, NotebooksApi, ServiceUsage};
use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use wbdiag_common::{GcpApiError, Result};

const NOTEBOOKS_BASE_URL: &str = "https://notebooks.googleapis.com";
const SERVICE_USAGE_BASE_URL: &str = "https://serviceusage.googleapis.com/v1";

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_MAX: Duration = Duration::from_secs(32);

/// Delay before retry number `attempt` (0-based): 500ms doubling, capped at 32s.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    BACKOFF_BASE.saturating_mul(factor).min(BACKOFF_MAX)
}

/// Shared HTTP plumbing: bearer auth, quota project header, retries.
#[derive(Clone)]
struct Transport {
    client: Client,
    access_token: Arc<str>,
}

impl Transport {
    fn headers(&self, project_id: &str) -> Result<reqwest::header::HeaderMap> {
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", self.access_token);
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth)
                .map_err(|e| GcpApiError::transport("authorization header", e))?,
        );
        if let Ok(v) = reqwest::header::HeaderValue::from_str(project_id) {
            headers.insert("x-goog-user-project", v);
        }
        Ok(headers)
    }

    /// GET `url` and decode the JSON body, retrying transient failures up to `num_retries` times.
    async fn get_json(
        &self,
        method: &str,
        url: &str,
        query: &[(&str, &str)],
        project_id: &str,
        num_retries: u32,
    ) -> Result<Value> {
        let headers = self.headers(project_id)?;
        let mut attempt = 0u32;
        loop {
            let result = self.get_once(method, url, query, headers.clone()).await;
            match result {
                Ok(v) => return Ok(v),
                Err(err) if err.is_retryable() && attempt < num_retries => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        "{} failed (status={:?}): {}; retry {}/{} in {:?}",
                        method,
                        err.status,
                        err.message,
                        attempt + 1,
                        num_retries,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn get_once(
        &self,
        method: &str,
        url: &str,
        query: &[(&str, &str)],
        headers: reqwest::header::HeaderMap,
    ) -> std::result::Result<Value, GcpApiError> {
        tracing::debug!("GET {} ({})", url, method);
        let resp = self
            .client
            .get(url)
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(|e| GcpApiError::transport(method, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GcpApiError::transport(method, e))?;
        if !status.is_success() {
            return Err(GcpApiError::from_response(method, status.as_u16(), &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&text).map_err(|e| GcpApiError {
            method: method.to_string(),
            status: Some(status.as_u16()),
            message: format!("invalid JSON in response: {}", e),
            reason: None,
            service: None,
            body: Some(text),
        })
    }
}

/// Google Cloud implementation of the capability checker and API client factory.
pub struct GcpProvider {
    transport: Transport,
    notebooks_base_url: String,
    service_usage_base_url: String,
    api_retries: u32,
    enabled_services: Mutex<HashMap<String, Arc<HashSet<String>>>>,
}

impl GcpProvider {
    pub fn new(access_token: String, api_retries: u32) -> anyhow::Result<Self> {
        let access_token = access_token.trim().to_string();
        if access_token.is_empty() {
            anyhow::bail!("empty access token");
        }
        // Default reqwest client has no overall timeout; a stalled API call would hang the run.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            transport: Transport {
                client,
                access_token: access_token.into(),
            },
            notebooks_base_url: NOTEBOOKS_BASE_URL.to_string(),
            service_usage_base_url: SERVICE_USAGE_BASE_URL.to_string(),
            api_retries,
            enabled_services: Mutex::new(HashMap::new()),
        })
    }

    /// Point the provider at other endpoints (regional endpoints, local emulators).
    pub fn with_base_urls(mut self, notebooks: &str, service_usage: &str) -> Self {
        self.notebooks_base_url = notebooks.trim_end_matches('/').to_string();
        self.service_usage_base_url = service_usage.trim_end_matches('/').to_string();
        self
    }

    async fn list_enabled_services(&self, project_id: &str) -> Result<Arc<HashSet<String>>> {
        let mut cache = self.enabled_services.lock().await;
        if let Some(set) = cache.get(project_id) {
            return Ok(set.clone());
        }

        tracing::info!("listing enabled APIs in project {}", project_id);
        let url = format!(
            "{}/projects/{}/services",
            self.service_usage_base_url, project_id
        );
        let mut services = HashSet::new();
        let mut page_token: Option<String> = None;
        loop {
            let resp = {
                let mut query = vec![("filter", "state:ENABLED")];
                if let Some(token) = page_token.as_deref() {
                    query.push(("pageToken", token));
                }
                self.transport
                    .get_json("services.list", &url, &query, project_id, self.api_retries)
                    .await?
            };
            if let Some(items) = resp["services"].as_array() {
                for s in items {
                    if let Some(name) = s["config"]["name"].as_str() {
                        services.insert(name.to_string());
                    }
                }
            }
            match resp["nextPageToken"].as_str() {
                Some(token) if !token.is_empty() => page_token = Some(token.to_string()),
                _ => break,
            }
        }

        let set = Arc::new(services);
        cache.insert(project_id.to_string(), set.clone());
        Ok(set)
    }
}

#[async_trait]
impl ServiceUsage for GcpProvider {
    async fn is_enabled(&self, project_id: &str, service_name: &str) -> Result<bool> {
        let services = self.list_enabled_services(project_id).await?;
        Ok(services.contains(&service_endpoint(service_name)))
    }
}

impl ApiClientFactory for GcpProvider {
    fn notebooks_api(
        &self,
        version: &str,
        project_id: &str,
    ) -> Result<Arc<dyn NotebooksApi>> {
        Ok(Arc::new(GcpNotebooksApi {
            transport: self.transport.clone(),
            base_url: format!("{}/{}", self.notebooks_base_url, version),
            project_id: project_id.to_string(),
        }))
    }
}

/// Notebooks API handle bound to one version and quota project.
pub struct GcpNotebooksApi {
    transport: Transport,
    base_url: String,
    project_id: String,
}

impl GcpNotebooksApi {
    fn list_url(&self, parent: &str) -> String {
        format!("{}/{}/instances", self.base_url, parent)
    }

    fn health_url(&self, name: &str) -> String {
        format!("{}/{}:getInstanceHealth", self.base_url, name)
    }
}

#[async_trait]
impl NotebooksApi for GcpNotebooksApi {
    async fn list_instances(&self, parent: &str, num_retries: u32) -> Result<Value> {
        self.transport
            .get_json(
                "projects.locations.instances.list",
                &self.list_url(parent),
                &[],
                &self.project_id,
                num_retries,
            )
            .await
    }

    async fn get_instance_health(&self, name: &str, num_retries: u32) -> Result<Value> {
        self.transport
            .get_json(
                "projects.locations.instances.getInstanceHealth",
                &self.health_url(name),
                &[],
                &self.project_id,
                num_retries,
            )
            .await
    }
}
