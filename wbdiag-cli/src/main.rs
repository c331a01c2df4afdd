mod provider_manager;

use anyhow::{Context as _, Result};
use provider_manager::ProviderManager;
use tracing_subscriber::EnvFilter;
use wbdiag_common::Config;
use wbdiag_queries::notebooks::{get_instance_health_state, get_instances, InstanceHealthState};
use wbdiag_queries::{Context, Resource};

/// One line of the instance report.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InstanceRow {
    short_path: String,
    state: String,
    health: InstanceHealthState,
}

/// List every notebook instance of the context's project with its health state, sorted by path.
async fn collect_report(context: &Context) -> Result<Vec<InstanceRow>> {
    let instances = get_instances(context)
        .await
        .context("listing notebook instances failed")?;

    let mut names: Vec<&String> = instances.keys().collect();
    names.sort();

    let mut rows = Vec::with_capacity(names.len());
    for name in names {
        let instance = &instances[name];
        let health = get_instance_health_state(context, name)
            .await
            .with_context(|| format!("fetching health of {} failed", name))?;
        rows.push(InstanceRow {
            short_path: instance.short_path(),
            state: instance.state().unwrap_or("-").to_string(),
            health,
        });
    }
    Ok(rows)
}

fn render(project_id: &str, rows: &[InstanceRow]) -> String {
    if rows.is_empty() {
        return format!("No Vertex AI Workbench notebook instances in project {}\n", project_id);
    }
    let width = rows.iter().map(|r| r.short_path.len()).max().unwrap_or(0);
    let mut out = String::new();
    for row in rows {
        out.push_str(&format!(
            "{:<width$}  {:<10}  {}\n",
            row.short_path,
            row.state,
            row.health,
            width = width
        ));
    }
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    let project_id = std::env::args()
        .nth(1)
        .or_else(|| config.project_id.clone())
        .context("usage: wbdiag <PROJECT_ID> (or set WBDIAG_PROJECT_ID)")?;

    tracing::info!(
        "🚀 wbdiag starting: provider={} project={} api_retries={}",
        config.provider,
        project_id,
        config.api_retries
    );

    let providers = ProviderManager::get_provider(&config)?;
    let context = Context::from_config(&config, project_id, providers.services, providers.apis);

    let rows = collect_report(&context).await?;
    print!("{}", render(context.project_id(), &rows));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use wbdiag_providers::mock::MockProvider;

    fn context(provider: &MockProvider) -> Context {
        Context::new("p1", Arc::new(provider.clone()), Arc::new(provider.clone()))
    }

    #[tokio::test]
    async fn report_lists_sorted_instances_with_health() {
        let provider = MockProvider::builder()
            .enable_service("p1", "notebooks")
            .listing(
                "projects/p1/locations/-",
                json!({"instances": [
                    {"name": "projects/p1/locations/us-west1-b/instances/zeta", "state": "STOPPED"},
                    {"name": "projects/p1/locations/us-west1-a/instances/alpha", "state": "ACTIVE"}
                ]}),
            )
            .health(
                "projects/p1/locations/us-west1-a/instances/alpha",
                json!({"healthState": "HEALTHY"}),
            )
            .health(
                "projects/p1/locations/us-west1-b/instances/zeta",
                json!({"healthState": "AGENT_NOT_INSTALLED"}),
            )
            .build();

        let rows = collect_report(&context(&provider)).await.unwrap();
        assert_eq!(
            rows,
            vec![
                InstanceRow {
                    short_path: "p1/us-west1-a/alpha".to_string(),
                    state: "ACTIVE".to_string(),
                    health: InstanceHealthState::Healthy,
                },
                InstanceRow {
                    short_path: "p1/us-west1-b/zeta".to_string(),
                    state: "STOPPED".to_string(),
                    health: InstanceHealthState::AgentNotInstalled,
                },
            ]
        );

        let text = render("p1", &rows);
        assert_eq!(
            text,
            "p1/us-west1-a/alpha  ACTIVE      HEALTHY\np1/us-west1-b/zeta   STOPPED     AGENT_NOT_INSTALLED\n"
        );
    }

    #[tokio::test]
    async fn report_fails_on_health_error() {
        let provider = MockProvider::builder()
            .enable_service("p1", "notebooks")
            .listing(
                "projects/p1/locations/-",
                json!({"instances": [{"name": "projects/p1/locations/l1/instances/i1"}]}),
            )
            .error("projects/p1/locations/l1/instances/i1", 500, "backend error")
            .build();

        let err = collect_report(&context(&provider)).await.unwrap_err();
        assert!(err.to_string().contains("fetching health of"));
    }

    #[test]
    fn render_empty_project() {
        assert_eq!(
            render("p1", &[]),
            "No Vertex AI Workbench notebook instances in project p1\n"
        );
    }
}
