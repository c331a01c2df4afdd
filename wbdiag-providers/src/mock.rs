use crate::{service_endpoint, ApiClientFactory, NotebooksApi, ServiceUsage};
use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wbdiag_common::{GcpApiError, Result};

/// In-memory stand-in for the Google Cloud APIs, fed from JSON fixtures.
///
/// Every call is counted so callers can check how often the "network" was hit.
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    enabled: HashMap<String, HashSet<String>>,
    // keyed by list parent
    listings: HashMap<String, Value>,
    // keyed by instance full path
    health: HashMap<String, Value>,
    // keyed by list parent or instance full path
    errors: HashMap<String, (u16, String)>,
    is_enabled_calls: AtomicUsize,
    factory_calls: AtomicUsize,
    list_calls: AtomicUsize,
    health_calls: AtomicUsize,
}

#[derive(Deserialize, Default)]
struct Fixture {
    #[serde(default)]
    projects: HashMap<String, ProjectFixture>,
}

#[derive(Deserialize, Default)]
struct ProjectFixture {
    #[serde(default)]
    enabled_services: Vec<String>,
    #[serde(default)]
    instances: Option<Value>,
    #[serde(default)]
    health: HashMap<String, Value>,
    #[serde(default)]
    errors: HashMap<String, ErrorFixture>,
}

#[derive(Deserialize)]
struct ErrorFixture {
    status: u16,
    #[serde(default)]
    body: Value,
}

/// Parent used by the all-regions listing of a project.
pub fn all_locations_parent(project_id: &str) -> String {
    format!("projects/{}/locations/-", project_id)
}

impl MockProvider {
    pub fn builder() -> MockProviderBuilder {
        MockProviderBuilder::default()
    }

    /// Load a fixture of the form:
    ///
    /// ```json
    /// {"projects": {"<project>": {
    ///     "enabled_services": ["notebooks.googleapis.com"],
    ///     "instances": {"instances": [...]},
    ///     "health": {"<instance full path>": {"healthState": "HEALTHY"}},
    ///     "errors": {"<parent or instance full path>": {"status": 403, "body": {...}}}
    /// }}}
    /// ```
    pub fn from_fixture(fixture: Value) -> anyhow::Result<Self> {
        let fixture: Fixture =
            serde_json::from_value(fixture).context("invalid mock provider fixture")?;
        let mut builder = Self::builder();
        for (project_id, project) in fixture.projects {
            for service in project.enabled_services {
                builder = builder.enable_service(&project_id, &service);
            }
            if let Some(listing) = project.instances {
                builder = builder.listing(&all_locations_parent(&project_id), listing);
            }
            for (name, resp) in project.health {
                builder = builder.health(&name, resp);
            }
            for (key, err) in project.errors {
                let body = match err.body {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                builder = builder.error(&key, err.status, &body);
            }
        }
        Ok(builder.build())
    }

    pub fn from_fixture_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("fixture {} is not valid JSON", path.display()))?;
        Self::from_fixture(value)
    }

    pub fn is_enabled_calls(&self) -> usize {
        self.state.is_enabled_calls.load(Ordering::SeqCst)
    }

    pub fn factory_calls(&self) -> usize {
        self.state.factory_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.state.list_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> usize {
        self.state.health_calls.load(Ordering::SeqCst)
    }

    fn injected_error(&self, method: &str, key: &str) -> Option<GcpApiError> {
        self.state
            .errors
            .get(key)
            .map(|(status, body)| GcpApiError::from_response(method, *status, body))
    }
}

#[derive(Default)]
pub struct MockProviderBuilder {
    state: MockState,
}

impl MockProviderBuilder {
    pub fn enable_service(mut self, project_id: &str, service_name: &str) -> Self {
        self.state
            .enabled
            .entry(project_id.to_string())
            .or_default()
            .insert(service_endpoint(service_name));
        self
    }

    /// Raw `projects.locations.instances.list` response for `parent`.
    pub fn listing(mut self, parent: &str, response: Value) -> Self {
        self.state.listings.insert(parent.to_string(), response);
        self
    }

    /// Raw `getInstanceHealth` response for the instance `name`.
    pub fn health(mut self, name: &str, response: Value) -> Self {
        self.state.health.insert(name.to_string(), response);
        self
    }

    /// Fail calls addressed to `key` (a list parent or an instance name) with an HTTP error.
    pub fn error(mut self, key: &str, status: u16, body: &str) -> Self {
        self.state
            .errors
            .insert(key.to_string(), (status, body.to_string()));
        self
    }

    pub fn build(self) -> MockProvider {
        MockProvider {
            state: Arc::new(self.state),
        }
    }
}

#[async_trait]
impl ServiceUsage for MockProvider {
    async fn is_enabled(&self, project_id: &str, service_name: &str) -> Result<bool> {
        self.state.is_enabled_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .enabled
            .get(project_id)
            .map(|s| s.contains(&service_endpoint(service_name)))
            .unwrap_or(false))
    }
}

impl ApiClientFactory for MockProvider {
    fn notebooks_api(&self, _version: &str, _project_id: &str) -> Result<Arc<dyn NotebooksApi>> {
        self.state.factory_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl NotebooksApi for MockProvider {
    async fn list_instances(&self, parent: &str, _num_retries: u32) -> Result<Value> {
        self.state.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.injected_error("projects.locations.instances.list", parent) {
            return Err(err.into());
        }
        // Unknown parents behave like a project without instances.
        Ok(self
            .state
            .listings
            .get(parent)
            .cloned()
            .unwrap_or_else(|| json!({})))
    }

    async fn get_instance_health(&self, name: &str, _num_retries: u32) -> Result<Value> {
        self.state.health_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) =
            self.injected_error("projects.locations.instances.getInstanceHealth", name)
        {
            return Err(err.into());
        }
        match self.state.health.get(name) {
            Some(resp) => Ok(resp.clone()),
            None => Err(GcpApiError::from_response(
                "projects.locations.instances.getInstanceHealth",
                404,
                &json!({
                    "error": {
                        "code": 404,
                        "message": format!("Resource '{}' was not found", name),
                        "status": "NOT_FOUND"
                    }
                })
                .to_string(),
            )
            .into()),
        }
    }
}
