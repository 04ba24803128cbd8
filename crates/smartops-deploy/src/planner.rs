//! The capacity planner pod.
//!
//! Probes an app's blueprint to produce capacity plans. The pod reports
//! back through the REST surface, so it only needs the app's topology and
//! test plan plus where to post results.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use smartops_blueprint::{ResourceDocument, extract_topology};
use smartops_lifecycle::DeployArgs;
use smartops_state::AppId;

use crate::error::{DeployError, DeployResult};

pub const PLANNER_CONTAINER: &str = "capacity-planner";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityPlannerConfig {
    pub image: String,
    /// Where the planner posts its results.
    pub api_endpoint: String,
}

impl Default for CapacityPlannerConfig {
    fn default() -> Self {
        Self {
            image: "smartops/capacity-planner:latest".to_string(),
            api_endpoint: "http://smartops-api:8080".to_string(),
        }
    }
}

/// Cluster name of the planner pod for `app_id`.
pub fn planner_name(app_id: AppId) -> String {
    format!("capplanner-app-{app_id}")
}

/// Name the planner gives the capacity plan it records.
pub fn capacity_plan_name(app_id: AppId) -> String {
    format!("capacity_plan_{app_id}")
}

/// Build the planner Pod document for one dry run.
pub fn planner_document(
    config: &CapacityPlannerConfig,
    args: &DeployArgs,
) -> DeployResult<ResourceDocument> {
    let topology = extract_topology(&args.blueprint)
        .map_err(|e| DeployError::Deployment(format!("cannot derive topology: {e}")))?;
    let topology = serde_json::to_string(&topology)
        .map_err(|e| DeployError::Deployment(format!("cannot encode topology: {e}")))?;
    let test_plan = serde_json::to_string(&args.test_plan)
        .map_err(|e| DeployError::Deployment(format!("cannot encode test plan: {e}")))?;

    let env = [
        ("APP_ID", args.app_id.to_string()),
        ("ENTRYPOINT", args.entrypoint.clone().unwrap_or_default()),
        ("API_ENDPOINT", config.api_endpoint.clone()),
        ("PLANNER_NAME", capacity_plan_name(args.app_id)),
        ("TOPOLOGY", topology),
        ("TEST_PLAN", test_plan),
    ]
    .into_iter()
    .map(|(name, value)| json!({"name": name, "value": value}))
    .collect::<Vec<_>>();

    let pod = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": planner_name(args.app_id)},
        "spec": {
            "containers": [{
                "name": PLANNER_CONTAINER,
                "image": config.image,
                "env": env,
            }],
            "restartPolicy": "Never",
        }
    });

    match pod {
        Value::Object(fields) => Ok(ResourceDocument::new(fields)),
        _ => Err(DeployError::Deployment("planner pod is not a mapping".to_string())),
    }
}
