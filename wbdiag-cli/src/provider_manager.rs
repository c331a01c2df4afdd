use anyhow::{bail, Result};
#[cfg(feature = "provider-gcp")]
use std::env;
#[cfg(feature = "provider-gcp")]
use std::fs;
use std::sync::Arc;
use wbdiag_common::Config;
use wbdiag_providers::{ApiClientFactory, ServiceUsage};

/// Collaborators handed to a query context.
pub struct Providers {
    pub services: Arc<dyn ServiceUsage>,
    pub apis: Arc<dyn ApiClientFactory>,
}

impl Providers {
    fn from_shared<P>(provider: Arc<P>) -> Self
    where
        P: ServiceUsage + ApiClientFactory + 'static,
    {
        Self {
            services: provider.clone(),
            apis: provider,
        }
    }
}

pub struct ProviderManager;

impl ProviderManager {
    pub fn get_provider(config: &Config) -> Result<Providers> {
        match config.provider.as_str() {
            #[cfg(feature = "provider-gcp")]
            "gcp" => {
                // Prefer *_FILE for secrets (Docker/K8s friendly), fallback to env var.
                let token = env::var("GOOGLE_OAUTH_ACCESS_TOKEN_FILE")
                    .ok()
                    .and_then(|path| fs::read_to_string(path).ok())
                    .or_else(|| env::var("GOOGLE_OAUTH_ACCESS_TOKEN").ok())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
                let Some(token) = token else {
                    bail!(
                        "no access token: set GOOGLE_OAUTH_ACCESS_TOKEN or GOOGLE_OAUTH_ACCESS_TOKEN_FILE"
                    );
                };
                let provider =
                    wbdiag_providers::gcp::GcpProvider::new(token, config.api_retries)?;
                Ok(Providers::from_shared(Arc::new(provider)))
            }
            #[cfg(feature = "provider-mock")]
            "mock" => {
                let provider = match config.mock_fixture.as_deref() {
                    Some(path) => wbdiag_providers::mock::MockProvider::from_fixture_file(path)?,
                    None => wbdiag_providers::mock::MockProvider::default(),
                };
                Ok(Providers::from_shared(Arc::new(provider)))
            }
            other => bail!("unsupported provider {:?}", other),
        }
    }
}
