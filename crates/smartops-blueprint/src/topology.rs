//! Topology extraction — which services exist and how many pods back them.
//!
//! The topology is keyed by the service's selector name (falling back to
//! its own name). Statefulsets and replica controllers then attach their
//! replica count to the entry they select. Documents are partitioned by
//! kind before any lookup, so input order does not matter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{ResourceDocument, ResourceKind};
use crate::error::{BlueprintError, BlueprintResult};

/// Replicas assumed when a controller omits `spec.replicas`.
pub const DEFAULT_REPLICAS: u32 = 1;

/// One service in the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyEntry {
    pub service_name: String,
    /// Unset when no controller or statefulset selects this service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica: Option<u32>,
}

/// Service selector name → entry.
pub type Topology = BTreeMap<String, TopologyEntry>;

/// Aggregate counts cached on the owning app.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCounts {
    pub containers: u32,
    pub pods: u32,
    pub services: u32,
}

/// Derive the topology from a validated document set.
///
/// A controller or statefulset that selects a service absent from the
/// topology is rejected rather than creating a partial entry.
pub fn extract_topology(documents: &[ResourceDocument]) -> BlueprintResult<Topology> {
    let services = documents.iter().filter(|d| d.is_kind(ResourceKind::Service));
    let statefulsets = documents.iter().filter(|d| d.is_kind(ResourceKind::StatefulSet));
    let controllers = documents.iter().filter(|d| {
        d.resource_kind()
            .map(|kind| kind.is_replica_controller())
            .unwrap_or(false)
    });

    let mut topology = Topology::new();

    for service in services {
        let service_name = service.name().ok_or_else(|| {
            BlueprintError::Validation("Service name is missing in metadata".to_string())
        })?;
        let key = service
            .lookup_str(&["spec", "selector", "name"])
            .unwrap_or(service_name);
        topology.insert(
            key.to_string(),
            TopologyEntry {
                service_name: service_name.to_string(),
                replica: None,
            },
        );
    }

    for statefulset in statefulsets {
        let label = display_name(statefulset);
        let key = statefulset
            .lookup_str(&["spec", "serviceName"])
            .ok_or_else(|| {
                BlueprintError::Validation(format!("StatefulSet {label} has no spec.serviceName"))
            })?;
        let replicas = replicas(statefulset)?;
        let entry = topology.get_mut(key).ok_or_else(|| unknown_service(&label, key))?;
        entry.replica = Some(replicas);
    }

    for controller in controllers {
        let label = display_name(controller);
        let candidates: Vec<&str> = [
            &["spec", "selector", "name"][..],
            &["spec", "selector", "matchLabels", "name"][..],
            &["spec", "template", "metadata", "labels", "name"][..],
        ]
        .into_iter()
        .filter_map(|path| controller.lookup_str(path))
        .collect();

        let key = candidates
            .iter()
            .copied()
            .find(|key| topology.contains_key(*key))
            .ok_or_else(|| unknown_service(&label, candidates.last().copied().unwrap_or("<none>")))?;
        let replicas = replicas(controller)?;
        if let Some(entry) = topology.get_mut(key) {
            entry.replica = Some(replicas);
        }
    }

    Ok(topology)
}

/// Compute the counts cached on the app.
///
/// Only documents carrying a pod template contribute containers, so
/// Secrets and Namespaces never count. Totals that do not fit in a `u32`
/// are rejected.
pub fn resource_counts(
    documents: &[ResourceDocument],
    topology: &Topology,
) -> BlueprintResult<ResourceCounts> {
    let mut containers: u32 = 0;
    for document in documents
        .iter()
        .filter(|d| d.lookup(&["spec", "template"]).is_some())
    {
        let len = document.template_containers().map_or(0, Vec::len);
        containers = u32::try_from(len)
            .ok()
            .and_then(|n| containers.checked_add(n))
            .ok_or_else(|| too_large("container"))?;
    }

    let pods = topology
        .values()
        .try_fold(0u32, |total, entry| total.checked_add(entry.replica.unwrap_or(0)))
        .ok_or_else(|| too_large("pod"))?;
    let services = u32::try_from(topology.len()).map_err(|_| too_large("service"))?;

    Ok(ResourceCounts {
        containers,
        pods,
        services,
    })
}

fn too_large(what: &str) -> BlueprintError {
    BlueprintError::Validation(format!("blueprint {what} count exceeds {}", u32::MAX))
}

fn replicas(document: &ResourceDocument) -> BlueprintResult<u32> {
    match document.lookup(&["spec", "replicas"]) {
        None | Some(Value::Null) => Ok(DEFAULT_REPLICAS),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                BlueprintError::Validation(format!(
                    "{} has an invalid spec.replicas: {value}",
                    display_name(document)
                ))
            }),
    }
}

fn display_name(document: &ResourceDocument) -> String {
    format!(
        "{} {}",
        document.kind().unwrap_or("resource"),
        document.name().unwrap_or("<unnamed>")
    )
}

fn unknown_service(label: &str, key: &str) -> BlueprintError {
    BlueprintError::Validation(format!("{label} references unknown service {key}"))
}
