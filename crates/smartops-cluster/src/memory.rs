//! In-memory cluster for tests and `cluster.mode = "memory"`.
//!
//! Stores every created object, records every call in order, and can be
//! told to reject all creates of a given kind.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use smartops_blueprint::ResourceKind;
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::{ApiResult, ClusterApi};
use crate::error::ClusterApiError;
use crate::resources::{Deployment, Namespace, Pod, ReplicationController, Service, StatefulSet};

/// One call made against the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    ListNamespaces,
    Create {
        kind: ResourceKind,
        namespace: Option<String>,
        name: String,
    },
}

type ObjectKey = (ResourceKind, Option<String>, String);

#[derive(Default)]
struct Inner {
    namespaces: BTreeSet<String>,
    objects: HashMap<ObjectKey, Value>,
    calls: Vec<ClusterCall>,
    failing: HashSet<ResourceKind>,
}

#[derive(Default)]
pub struct MemoryCluster {
    inner: Mutex<Inner>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing namespace.
    pub fn with_namespace(mut self, name: &str) -> Self {
        self.inner.get_mut().namespaces.insert(name.to_string());
        self
    }

    /// Reject every subsequent create of `kind`.
    pub async fn fail_kind(&self, kind: ResourceKind) {
        self.inner.lock().await.failing.insert(kind);
    }

    pub async fn calls(&self) -> Vec<ClusterCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Number of create calls, successful or not.
    pub async fn create_calls(&self) -> usize {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| matches!(c, ClusterCall::Create { .. }))
            .count()
    }

    pub async fn namespaces(&self) -> Vec<String> {
        self.inner.lock().await.namespaces.iter().cloned().collect()
    }

    /// A stored object, as the cluster would return it.
    pub async fn object(&self, kind: ResourceKind, namespace: Option<&str>, name: &str) -> Option<Value> {
        let key = (kind, namespace.map(str::to_string), name.to_string());
        self.inner.lock().await.objects.get(&key).cloned()
    }

    async fn create<T: Serialize + Sync>(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: Option<&str>,
        body: &T,
    ) -> ApiResult {
        let name = name.unwrap_or_default().to_string();
        let namespace = namespace.map(str::to_string);
        let mut inner = self.inner.lock().await;
        inner.calls.push(ClusterCall::Create {
            kind,
            namespace: namespace.clone(),
            name: name.clone(),
        });

        if inner.failing.contains(&kind) {
            return Err(ClusterApiError::Rejected(format!(
                "{} {name} refused by test cluster",
                kind.as_str()
            )));
        }
        if let Some(ns) = &namespace {
            if !inner.namespaces.contains(ns) {
                return Err(ClusterApiError::Status {
                    status: 404,
                    message: format!("namespaces \"{ns}\" not found"),
                });
            }
        }

        let key = (kind, namespace.clone(), name.clone());
        if inner.objects.contains_key(&key) {
            return Err(ClusterApiError::Status {
                status: 409,
                message: format!("{} \"{name}\" already exists", kind.as_str()),
            });
        }

        let value =
            serde_json::to_value(body).map_err(|e| ClusterApiError::Decode(e.to_string()))?;
        if kind == ResourceKind::Namespace {
            inner.namespaces.insert(name.clone());
        }
        inner.objects.insert(key, value.clone());
        debug!(kind = kind.as_str(), ?namespace, %name, "object created in memory cluster");
        Ok(value)
    }
}

#[async_trait]
impl ClusterApi for MemoryCluster {
    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterApiError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(ClusterCall::ListNamespaces);
        Ok(inner.namespaces.iter().cloned().collect())
    }

    async fn create_namespace(&self, body: &Namespace) -> ApiResult {
        self.create(ResourceKind::Namespace, None, body.metadata.name.as_deref(), body)
            .await
    }

    async fn create_pod(&self, namespace: &str, body: &Pod) -> ApiResult {
        self.create(ResourceKind::Pod, Some(namespace), body.metadata.name.as_deref(), body)
            .await
    }

    async fn create_service(&self, namespace: &str, body: &Service) -> ApiResult {
        self.create(ResourceKind::Service, Some(namespace), body.metadata.name.as_deref(), body)
            .await
    }

    async fn create_replication_controller(
        &self,
        namespace: &str,
        body: &ReplicationController,
    ) -> ApiResult {
        self.create(
            ResourceKind::ReplicationController,
            Some(namespace),
            body.metadata.name.as_deref(),
            body,
        )
        .await
    }

    async fn create_deployment(&self, namespace: &str, body: &Deployment) -> ApiResult {
        self.create(ResourceKind::Deployment, Some(namespace), body.metadata.name.as_deref(), body)
            .await
    }

    async fn create_stateful_set(&self, namespace: &str, body: &StatefulSet) -> ApiResult {
        self.create(ResourceKind::StatefulSet, Some(namespace), body.metadata.name.as_deref(), body)
            .await
    }
}
