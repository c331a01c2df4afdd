use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use wbdiag_common::Result;

/// Short service name of the Vertex AI Workbench notebooks API.
pub const NOTEBOOKS_SERVICE: &str = "notebooks";
pub const NOTEBOOKS_API_VERSION: &str = "v1";

/// Fully qualified endpoint name for a short service name
/// (`notebooks` -> `notebooks.googleapis.com`).
pub fn service_endpoint(service_name: &str) -> String {
    if service_name.contains('.') {
        service_name.to_string()
    } else {
        format!("{}.googleapis.com", service_name)
    }
}

/// Answers whether an API is enabled for a project.
#[async_trait]
pub trait ServiceUsage: Send + Sync {
    async fn is_enabled(&self, project_id: &str, service_name: &str) -> Result<bool>;
}

/// Produces authenticated notebooks API handles.
pub trait ApiClientFactory: Send + Sync {
    fn notebooks_api(&self, version: &str, project_id: &str) -> Result<Arc<dyn NotebooksApi>>;
}

/// Raw calls against the notebooks API. Responses are returned as the decoded JSON body.
///
/// Implementations retry transient failures up to `num_retries` times; every other
/// failure surfaces as `DiagError::Api`.
#[async_trait]
pub trait NotebooksApi: Send + Sync {
    /// `projects.locations.instances.list`; `parent` is `projects/{p}/locations/{l}` (`-` for all).
    async fn list_instances(&self, parent: &str, num_retries: u32) -> Result<Value>;

    /// `projects.locations.instances.getInstanceHealth`; `name` is the instance's full path.
    async fn get_instance_health(&self, name: &str, num_retries: u32) -> Result<Value>;
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "gcp")]
pub mod gcp;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_short_service_names() {
        assert_eq!(service_endpoint("notebooks"), "notebooks.googleapis.com");
        assert_eq!(
            service_endpoint("notebooks.googleapis.com"),
            "notebooks.googleapis.com"
        );
    }
}
