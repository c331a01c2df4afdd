//! Queries related to Vertex AI Workbench notebook instances.

use crate::models::{Context, Resource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use wbdiag_common::{DiagError, Result};
use wbdiag_providers::{NOTEBOOKS_API_VERSION, NOTEBOOKS_SERVICE};

const HEALTH_STATE_KEY: &str = "healthState";
const INSTANCES_KEY: &str = "instances";
const NAME_KEY: &str = "name";

/// Health states reported by `projects.locations.instances.getInstanceHealth`.
///
/// <https://cloud.google.com/vertex-ai/docs/workbench/reference/rest/v1/projects.locations.instances/getInstanceHealth#healthstate>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceHealthState {
    #[default]
    HealthStateUnspecified,
    Healthy,
    Unhealthy,
    AgentNotInstalled,
    AgentNotRunning,
}

impl InstanceHealthState {
    pub const ALL: [InstanceHealthState; 5] = [
        InstanceHealthState::HealthStateUnspecified,
        InstanceHealthState::Healthy,
        InstanceHealthState::Unhealthy,
        InstanceHealthState::AgentNotInstalled,
        InstanceHealthState::AgentNotRunning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceHealthState::HealthStateUnspecified => "HEALTH_STATE_UNSPECIFIED",
            InstanceHealthState::Healthy => "HEALTHY",
            InstanceHealthState::Unhealthy => "UNHEALTHY",
            InstanceHealthState::AgentNotInstalled => "AGENT_NOT_INSTALLED",
            InstanceHealthState::AgentNotRunning => "AGENT_NOT_RUNNING",
        }
    }
}

impl FromStr for InstanceHealthState {
    type Err = DiagError;

    /// Exact, case-sensitive match on the API tag.
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| DiagError::UnknownHealthState(s.to_string()))
    }
}

impl fmt::Display for InstanceHealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Vertex AI Workbench user-managed notebook instance.
///
/// Read-only view over the resource returned by `projects.locations.instances.list`.
/// <https://cloud.google.com/vertex-ai/docs/workbench/reference/rest/v1/projects.locations.instances#resource:-instance>
#[derive(Debug, Clone)]
pub struct Instance {
    project_id: String,
    full_path: String,
    resource_data: Arc<Map<String, Value>>,
}

impl Instance {
    /// Wrap a raw instance record. The record must be an object with a non-empty `name`.
    pub fn new(project_id: impl Into<String>, resource_data: Value) -> Result<Self> {
        let Value::Object(resource_data) = resource_data else {
            return Err(DiagError::Internal(
                "instance record in projects.locations.instances.list response is not an object"
                    .to_string(),
            ));
        };
        let full_path = match resource_data.get(NAME_KEY).and_then(|v| v.as_str()) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(DiagError::Internal(
                    "missing instance name in projects.locations.instances.list response"
                        .to_string(),
                ))
            }
        };
        Ok(Self {
            project_id: project_id.into(),
            full_path,
            resource_data: Arc::new(resource_data),
        })
    }

    /// The API already names instances by full path.
    pub fn name(&self) -> &str {
        &self.full_path
    }

    /// `{location}` segment of the full path (a zone such as `us-west1-a`).
    pub fn location(&self) -> Option<&str> {
        path_segment(&self.full_path, "locations")
    }

    /// `{instance}` segment of the full path.
    pub fn instance_id(&self) -> Option<&str> {
        path_segment(&self.full_path, "instances")
    }

    /// Lifecycle state, e.g. `ACTIVE` or `STOPPED`.
    pub fn state(&self) -> Option<&str> {
        self.resource_data.get("state").and_then(|v| v.as_str())
    }

    /// Machine type name; full URIs are reduced to their last segment.
    pub fn machine_type(&self) -> Option<&str> {
        self.resource_data
            .get("machineType")
            .and_then(|v| v.as_str())
            .map(|m| m.rsplit('/').next().unwrap_or(m))
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.resource_data
            .get("labels")
            .and_then(|v| v.as_object())
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn create_time(&self) -> Option<DateTime<Utc>> {
        self.resource_data
            .get("createTime")
            .and_then(|v| v.as_str())
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// Instances get an external IP unless created with `noPublicIp`.
    pub fn has_public_ip(&self) -> bool {
        !self
            .resource_data
            .get("noPublicIp")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn resource_data(&self) -> &Map<String, Value> {
        &self.resource_data
    }
}

impl Resource for Instance {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    fn full_path(&self) -> &str {
        &self.full_path
    }

    /// `projects/p1/locations/l1/instances/i1` -> `p1/l1/i1`
    fn short_path(&self) -> String {
        let path = self
            .full_path
            .strip_prefix("projects/")
            .unwrap_or(&self.full_path);
        path.replace("/locations/", "/").replace("/instances/", "/")
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path)
    }
}

fn path_segment<'a>(path: &'a str, label: &str) -> Option<&'a str> {
    let mut parts = path.split('/');
    while let Some(part) = parts.next() {
        if part == label {
            return parts.next().filter(|s| !s.is_empty());
        }
    }
    None
}

/// Instances keyed by full path.
pub type Instances = HashMap<String, Instance>;

/// All notebook instances of the context's project, across every location.
///
/// Returns an empty map when the notebooks API is disabled. Memoized per context.
pub async fn get_instances(context: &Context) -> Result<Instances> {
    let key = context.cache_key("notebooks::get_instances", &[]);
    context
        .cache()
        .get_or_try_insert(key, || fetch_instances(context))
        .await
}

async fn fetch_instances(context: &Context) -> Result<Instances> {
    let mut instances = Instances::new();
    if !context.is_enabled(NOTEBOOKS_SERVICE).await? {
        return Ok(instances);
    }
    tracing::info!(
        "fetching list of Vertex AI Workbench notebook instances in project {}",
        context.project_id()
    );
    let notebooks_api = context.notebooks_api(NOTEBOOKS_API_VERSION)?;
    // '-' (wildcard) selects all locations
    let parent = format!("projects/{}/locations/-", context.project_id());
    let resp = notebooks_api
        .list_instances(&parent, context.api_retries())
        .await?;

    let records = match resp.get(INSTANCES_KEY) {
        None | Some(Value::Null) => return Ok(instances),
        Some(Value::Array(records)) => records,
        Some(_) => {
            return Err(DiagError::Internal(
                "instances in projects.locations.instances.list response is not a list"
                    .to_string(),
            ))
        }
    };
    for record in records {
        let instance = Instance::new(context.project_id(), record.clone())?;
        instances.insert(instance.full_path().to_string(), instance);
    }
    Ok(instances)
}

/// Health state of the instance `name` (its full path).
///
/// Falls back to `HEALTH_STATE_UNSPECIFIED` without calling the API when the notebooks
/// API is disabled or `name` is empty. Memoized per context and name.
pub async fn get_instance_health_state(
    context: &Context,
    name: &str,
) -> Result<InstanceHealthState> {
    let key = context.cache_key("notebooks::get_instance_health_state", &[name]);
    context
        .cache()
        .get_or_try_insert(key, || fetch_instance_health_state(context, name))
        .await
}

async fn fetch_instance_health_state(
    context: &Context,
    name: &str,
) -> Result<InstanceHealthState> {
    if !context.is_enabled(NOTEBOOKS_SERVICE).await? {
        tracing::error!("Notebooks API is not enabled");
        return Ok(InstanceHealthState::HealthStateUnspecified);
    }
    if name.is_empty() {
        tracing::error!("Instance name not provided");
        return Ok(InstanceHealthState::HealthStateUnspecified);
    }
    tracing::info!(
        "fetching Vertex AI user-managed notebook instance health state in project {}",
        context.project_id()
    );
    let notebooks_api = context.notebooks_api(NOTEBOOKS_API_VERSION)?;
    let resp = notebooks_api
        .get_instance_health(name, context.api_retries())
        .await?;

    match resp.get(HEALTH_STATE_KEY) {
        None => Err(DiagError::Internal(
            "missing instance health state in projects.locations.instances:getInstanceHealth response"
                .to_string(),
        )),
        Some(Value::String(state)) => state.parse(),
        Some(other) => Err(DiagError::UnknownHealthState(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instance(data: Value) -> Instance {
        Instance::new("gcpdiag-notebooks1-aaaa", data).unwrap()
    }

    #[test]
    fn short_path_strips_segment_labels() {
        let i = instance(json!({"name": "projects/p1/locations/l1/instances/i1"}));
        assert_eq!(i.full_path(), "projects/p1/locations/l1/instances/i1");
        assert_eq!(i.name(), i.full_path());
        assert_eq!(i.short_path(), "p1/l1/i1");
        assert_eq!(i.location(), Some("l1"));
        assert_eq!(i.instance_id(), Some("i1"));
        assert_eq!(i.project_id(), "gcpdiag-notebooks1-aaaa");
    }

    #[test]
    fn rejects_records_without_name() {
        for data in [
            json!({"state": "ACTIVE"}),
            json!({"name": ""}),
            json!({"name": 42}),
            json!("projects/p1/locations/l1/instances/i1"),
        ] {
            let err = Instance::new("p1", data).unwrap_err();
            assert!(matches!(err, DiagError::Internal(_)));
        }
    }

    #[test]
    fn exposes_resource_fields() {
        let i = instance(json!({
            "name": "projects/p1/locations/us-west1-a/instances/nb1",
            "state": "ACTIVE",
            "machineType": "https://www.googleapis.com/compute/v1/projects/p1/zones/us-west1-a/machineTypes/n1-standard-4",
            "labels": {"env": "dev", "bad": 1},
            "createTime": "2023-01-30T10:15:00.123456Z",
            "noPublicIp": true
        }));
        assert_eq!(i.state(), Some("ACTIVE"));
        assert_eq!(i.machine_type(), Some("n1-standard-4"));
        assert_eq!(i.labels().get("env").map(String::as_str), Some("dev"));
        assert!(!i.labels().contains_key("bad"));
        let created = i.create_time().unwrap();
        assert_eq!(
            created.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "2023-01-30T10:15:00Z"
        );
        assert!(!i.has_public_ip());

        let bare = instance(json!({"name": "projects/p1/locations/l1/instances/i1"}));
        assert_eq!(bare.state(), None);
        assert!(bare.labels().is_empty());
        assert_eq!(bare.create_time(), None);
        assert!(bare.has_public_ip());
    }

    #[test]
    fn health_state_parses_exact_tags() {
        for state in InstanceHealthState::ALL {
            assert_eq!(state.as_str().parse::<InstanceHealthState>().unwrap(), state);
            assert_eq!(state.to_string(), state.as_str());
        }
        assert!(matches!(
            "FOO".parse::<InstanceHealthState>(),
            Err(DiagError::UnknownHealthState(ref s)) if s == "FOO"
        ));
        assert!("healthy".parse::<InstanceHealthState>().is_err());
        assert_eq!(InstanceHealthState::default(), InstanceHealthState::HealthStateUnspecified);
    }

    #[test]
    fn health_state_serde_uses_wire_tags() {
        assert_eq!(
            serde_json::to_value(InstanceHealthState::AgentNotRunning).unwrap(),
            json!("AGENT_NOT_RUNNING")
        );
        let state: InstanceHealthState = serde_json::from_value(json!("UNHEALTHY")).unwrap();
        assert_eq!(state, InstanceHealthState::Unhealthy);
    }
}
