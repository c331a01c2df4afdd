use std::fmt;
use std::sync::Arc;
use wbdiag_common::config::DEFAULT_API_RETRIES;
use wbdiag_common::{ApiCache, CacheKey, Config, Result};
use wbdiag_providers::{ApiClientFactory, NotebooksApi, ServiceUsage};

/// One diagnostic run against one project.
///
/// Holds the API collaborators and the call cache; query results stay memoized for as
/// long as the context (or any clone of it) lives.
#[derive(Clone)]
pub struct Context {
    project_id: String,
    api_retries: u32,
    services: Arc<dyn ServiceUsage>,
    apis: Arc<dyn ApiClientFactory>,
    cache: ApiCache,
}

impl Context {
    pub fn new(
        project_id: impl Into<String>,
        services: Arc<dyn ServiceUsage>,
        apis: Arc<dyn ApiClientFactory>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            api_retries: DEFAULT_API_RETRIES,
            services,
            apis,
            cache: ApiCache::new(),
        }
    }

    pub fn from_config(
        config: &Config,
        project_id: impl Into<String>,
        services: Arc<dyn ServiceUsage>,
        apis: Arc<dyn ApiClientFactory>,
    ) -> Self {
        Self::new(project_id, services, apis).with_api_retries(config.api_retries)
    }

    pub fn with_api_retries(mut self, api_retries: u32) -> Self {
        self.api_retries = api_retries;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn api_retries(&self) -> u32 {
        self.api_retries
    }

    pub fn cache(&self) -> &ApiCache {
        &self.cache
    }

    pub async fn is_enabled(&self, service_name: &str) -> Result<bool> {
        self.services
            .is_enabled(&self.project_id, service_name)
            .await
    }

    pub fn notebooks_api(&self, version: &str) -> Result<Arc<dyn NotebooksApi>> {
        self.apis.notebooks_api(version, &self.project_id)
    }

    /// Key for a memoized query of this context: the function plus the project and `args`.
    pub(crate) fn cache_key(&self, function: &'static str, args: &[&str]) -> CacheKey {
        CacheKey::new(
            function,
            std::iter::once(self.project_id.as_str()).chain(args.iter().copied()),
        )
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("project_id", &self.project_id)
            .field("api_retries", &self.api_retries)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project: {}", self.project_id)
    }
}

/// A cloud resource addressed by a hierarchical path.
pub trait Resource {
    fn project_id(&self) -> &str;

    /// Canonical identifier, e.g. `projects/p1/locations/l1/instances/i1`.
    fn full_path(&self) -> &str;

    /// Shortened identifier for display.
    fn short_path(&self) -> String {
        self.full_path().to_string()
    }
}
