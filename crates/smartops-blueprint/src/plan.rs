//! Dry-run base plan — the starting point handed to the capacity planner.
//!
//! Every controller whose template containers all declare resource limits
//! contributes one plan entry with its replica count and per-container
//! CPU (cores) and memory (MiB).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::ResourceDocument;
use crate::error::{BlueprintError, BlueprintResult};
use crate::topology::DEFAULT_REPLICAS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerPlan {
    pub name: String,
    pub pod_replicas: u32,
    pub containers: Vec<ContainerPlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerPlan {
    pub name: String,
    /// CPU limit in cores.
    pub cpu: f64,
    /// Memory limit in MiB.
    pub memory: f64,
}

/// Build the base plan from a blueprint's documents.
pub fn base_plan(documents: &[ResourceDocument]) -> BlueprintResult<Vec<ControllerPlan>> {
    let mut plans = Vec::new();

    for document in documents {
        let Some(containers) = document.template_containers() else {
            continue;
        };
        if !containers.iter().all(|c| c.get("resources").is_some()) {
            continue;
        }

        let name = document.name().unwrap_or_default().replace("rc", "");
        let pod_replicas = document
            .lookup(&["spec", "replicas"])
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(DEFAULT_REPLICAS);

        let containers = containers
            .iter()
            .map(container_plan)
            .collect::<BlueprintResult<Vec<_>>>()?;

        plans.push(ControllerPlan {
            name,
            pod_replicas,
            containers,
        });
    }

    Ok(plans)
}

fn container_plan(container: &Value) -> BlueprintResult<ContainerPlan> {
    let name = container
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let limits = container
        .get("resources")
        .and_then(|r| r.get("limits"))
        .ok_or_else(|| {
            BlueprintError::Validation(format!("container {name} has no resources.limits"))
        })?;

    let cpu = limits
        .get("cpu")
        .and_then(parse_cpu)
        .ok_or_else(|| invalid_limit(&name, "cpu"))?;
    let memory = limits
        .get("memory")
        .and_then(parse_memory_mib)
        .ok_or_else(|| invalid_limit(&name, "memory"))?;

    Ok(ContainerPlan { name, cpu, memory })
}

fn invalid_limit(container: &str, resource: &str) -> BlueprintError {
    BlueprintError::Validation(format!(
        "container {container} has a missing or invalid {resource} limit"
    ))
}

/// `"500m"` → 0.5, `"2"` / `2` → 2.0.
pub fn parse_cpu(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.strip_suffix('m') {
            Some(millis) => millis.trim().parse::<f64>().ok().map(|m| m / 1000.0),
            None => s.trim().parse().ok(),
        },
        _ => None,
    }
}

/// `"512Mi"` → 512, `"1Gi"` → 1024, bare numbers are bytes.
pub fn parse_memory_mib(value: &Value) -> Option<f64> {
    const MIB: f64 = 1024.0 * 1024.0;
    match value {
        Value::Number(n) => n.as_f64().map(|bytes| bytes / MIB),
        Value::String(s) => {
            let s = s.trim();
            let units: [(&str, f64); 4] = [("Ki", 1.0 / 1024.0), ("Mi", 1.0), ("Gi", 1024.0), ("Ti", 1024.0 * 1024.0)];
            for (suffix, factor) in units {
                if let Some(amount) = s.strip_suffix(suffix) {
                    return amount.trim().parse::<f64>().ok().map(|a| a * factor);
                }
            }
            s.parse::<f64>().ok().map(|bytes| bytes / MIB)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> ResourceDocument {
        match value {
            Value::Object(map) => ResourceDocument::new(map),
            _ => panic!("expected object"),
        }
    }

    fn rc(name: &str, containers: Value) -> ResourceDocument {
        doc(json!({
            "apiVersion": "v1", "kind": "ReplicationController", "metadata": {"name": name},
            "spec": {"replicas": 2, "template": {"spec": {"containers": containers}}}
        }))
    }

    #[test]
    fn plans_controllers_with_limits() {
        let docs = vec![rc(
            "webrc",
            json!([{"name": "nginx", "resources": {"limits": {"cpu": "250m", "memory": "128Mi"}}}]),
        )];
        let plans = base_plan(&docs).unwrap();

        assert_eq!(
            plans,
            vec![ControllerPlan {
                name: "web".to_string(),
                pod_replicas: 2,
                containers: vec![ContainerPlan {
                    name: "nginx".to_string(),
                    cpu: 0.25,
                    memory: 128.0,
                }],
            }]
        );
    }

    #[test]
    fn skips_controllers_without_resources() {
        let docs = vec![rc(
            "web",
            json!([
                {"name": "a", "resources": {"limits": {"cpu": "1", "memory": "1Gi"}}},
                {"name": "b"}
            ]),
        )];
        assert!(base_plan(&docs).unwrap().is_empty());
    }

    #[test]
    fn rejects_resources_without_limits() {
        let docs = vec![rc("web", json!([{"name": "a", "resources": {"requests": {}}}]))];
        assert!(matches!(base_plan(&docs), Err(BlueprintError::Validation(_))));
    }

    #[test]
    fn cpu_and_memory_units() {
        assert_eq!(parse_cpu(&json!("1500m")), Some(1.5));
        assert_eq!(parse_cpu(&json!("2")), Some(2.0));
        assert_eq!(parse_cpu(&json!(0.5)), Some(0.5));
        assert_eq!(parse_memory_mib(&json!("2Gi")), Some(2048.0));
        assert_eq!(parse_memory_mib(&json!("512Ki")), Some(0.5));
        assert_eq!(parse_memory_mib(&json!(1048576)), Some(1.0));
        assert_eq!(parse_memory_mib(&json!("lots")), None);
    }
}
