//! Resource documents and the closed set of resource kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// The resource kinds a blueprint may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Namespace,
    Pod,
    Service,
    ReplicationController,
    Deployment,
    StatefulSet,
    Secret,
}

/// A `kind` tag outside [`ResourceKind`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported resource kind: {0}")]
pub struct UnknownKind(pub String);

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Namespace,
        ResourceKind::Pod,
        ResourceKind::Service,
        ResourceKind::ReplicationController,
        ResourceKind::Deployment,
        ResourceKind::StatefulSet,
        ResourceKind::Secret,
    ];

    /// The wire tag used in the `kind` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::Pod => "Pod",
            ResourceKind::Service => "Service",
            ResourceKind::ReplicationController => "ReplicationController",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::Secret => "Secret",
        }
    }

    /// Replica controllers for topology purposes.
    pub fn is_replica_controller(&self) -> bool {
        matches!(
            self,
            ResourceKind::ReplicationController | ResourceKind::Deployment
        )
    }
}

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded manifest document.
///
/// Kept as the generic mapping it was decoded into so that it can be
/// stored and replayed verbatim; typed views are built on demand by the
/// cluster builders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceDocument(Map<String, Value>);

impl ResourceDocument {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Raw `kind` tag, if present and a string.
    pub fn kind(&self) -> Option<&str> {
        self.0.get("kind").and_then(Value::as_str)
    }

    /// The `kind` tag resolved against the closed kind set.
    pub fn resource_kind(&self) -> Result<ResourceKind, UnknownKind> {
        match self.kind() {
            Some(kind) => kind.parse(),
            None => Err(UnknownKind(String::new())),
        }
    }

    pub fn is_kind(&self, kind: ResourceKind) -> bool {
        self.kind() == Some(kind.as_str())
    }

    pub fn api_version(&self) -> Option<&str> {
        self.0.get("apiVersion").and_then(Value::as_str)
    }

    /// `metadata.name`.
    pub fn name(&self) -> Option<&str> {
        self.lookup_str(&["metadata", "name"])
    }

    pub fn spec(&self) -> Option<&Value> {
        self.0.get("spec")
    }

    /// Walk nested mappings by key.
    pub fn lookup(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.0.get(*first)?, |value, key| value.get(key))
    }

    pub fn lookup_str(&self, path: &[&str]) -> Option<&str> {
        self.lookup(path).and_then(Value::as_str)
    }

    /// `spec.template.spec.containers`, when the document carries a pod template.
    pub fn template_containers(&self) -> Option<&Vec<Value>> {
        self.lookup(&["spec", "template", "spec", "containers"])
            .and_then(Value::as_array)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for ResourceDocument {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
