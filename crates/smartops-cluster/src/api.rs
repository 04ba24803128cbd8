//! The cluster control plane as seen by the deploy pipeline.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ClusterApiError;
use crate::resources::{Deployment, Namespace, Pod, ReplicationController, Service, StatefulSet};

/// Create calls return the object as the cluster stored it.
pub type ApiResult = Result<Value, ClusterApiError>;

#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Names of existing namespaces.
    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterApiError>;

    async fn create_namespace(&self, body: &Namespace) -> ApiResult;

    async fn create_pod(&self, namespace: &str, body: &Pod) -> ApiResult;

    async fn create_service(&self, namespace: &str, body: &Service) -> ApiResult;

    async fn create_replication_controller(
        &self,
        namespace: &str,
        body: &ReplicationController,
    ) -> ApiResult;

    async fn create_deployment(&self, namespace: &str, body: &Deployment) -> ApiResult;

    async fn create_stateful_set(&self, namespace: &str, body: &StatefulSet) -> ApiResult;
}

/// REST collection path for a namespaced create.
pub(crate) fn collection_path(group: ApiGroup, namespace: &str, resource: &str) -> String {
    format!("{}/namespaces/{namespace}/{resource}", group.prefix())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApiGroup {
    Core,
    Apps,
}

impl ApiGroup {
    pub(crate) fn prefix(self) -> &'static str {
        match self {
            ApiGroup::Core => "/api/v1",
            ApiGroup::Apps => "/apis/apps/v1",
        }
    }
}
