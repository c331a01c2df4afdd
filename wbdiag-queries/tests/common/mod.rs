// Shared helpers for notebooks query tests.
#![allow(dead_code)]

use std::sync::Arc;
use wbdiag_providers::mock::MockProvider;
use wbdiag_queries::Context;

pub const PROJECT: &str = "gcpdiag-notebooks1-aaaa";
pub const INSTANCE1: &str =
    "projects/gcpdiag-notebooks1-aaaa/locations/us-west1-a/instances/gcpdiag-notebooks1instance-aaaa";
pub const INSTANCE2: &str =
    "projects/gcpdiag-notebooks1-aaaa/locations/us-central1-b/instances/gcpdiag-notebooks2instance-aaaa";

pub fn mock_provider() -> MockProvider {
    let fixture: serde_json::Value =
        serde_json::from_str(include_str!("../fixtures/notebooks1.json")).unwrap();
    MockProvider::from_fixture(fixture).unwrap()
}

pub fn context_for(provider: &MockProvider, project_id: &str) -> Context {
    Context::new(
        project_id,
        Arc::new(provider.clone()),
        Arc::new(provider.clone()),
    )
}
