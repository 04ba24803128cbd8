//! Deployment orchestrator — turns a blueprint into cluster create calls.
//!
//! Documents are created in input order. Secrets are skipped. A document
//! that cannot be built aborts the deploy without undoing earlier
//! creates; a create the cluster refuses is recorded and the loop goes on.

use std::sync::Arc;

use serde::Serialize;
use smartops_blueprint::{ResourceDocument, ResourceKind};
use smartops_cluster::{ClusterApi, CreatedResource, ResourceKindRegistry, create};
use smartops_cluster::resources::Namespace;
use smartops_lifecycle::LaunchOutcome;
use smartops_state::AppId;
use tracing::{debug, info};

use crate::error::{DeployError, DeployResult};

/// Namespace every resource of `app_id` is created in.
pub fn app_namespace(app_id: AppId) -> String {
    format!("smartops-app-{app_id}")
}

/// Collision-avoiding cluster name for a blueprint document.
pub fn resource_name(app_id: AppId, name: &str) -> String {
    format!("{app_id}{name}")
}

/// Everything one full deploy attempted.
#[derive(Debug, Default)]
pub struct DeployReport {
    pub namespace: String,
    pub resources: Vec<CreatedResource>,
}

/// One line of a report, for logs and status messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSummary {
    pub kind: String,
    pub name: String,
    pub created: bool,
}

impl DeployReport {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn failed(&self) -> impl Iterator<Item = &CreatedResource> {
        self.resources.iter().filter(|r| !r.is_created())
    }

    pub fn summary(&self) -> Vec<ResourceSummary> {
        self.resources
            .iter()
            .map(|r| ResourceSummary {
                kind: r.kind.as_str().to_string(),
                name: r.name.clone(),
                created: r.is_created(),
            })
            .collect()
    }

    /// Split into the created/failed names the lifecycle records.
    pub fn outcome(&self) -> LaunchOutcome {
        let (created, failed): (Vec<_>, Vec<_>) =
            self.resources.iter().partition(|r| r.is_created());
        LaunchOutcome {
            created: created.into_iter().map(|r| r.name.clone()).collect(),
            failed: failed.into_iter().map(|r| r.name.clone()).collect(),
        }
    }
}

#[derive(Clone)]
pub struct DeploymentOrchestrator {
    api: Arc<dyn ClusterApi>,
    registry: ResourceKindRegistry,
    ensure_namespace: bool,
}

impl DeploymentOrchestrator {
    pub fn new(api: Arc<dyn ClusterApi>) -> Self {
        Self {
            api,
            registry: ResourceKindRegistry,
            ensure_namespace: false,
        }
    }

    /// Create the app namespace before a full deploy if it is missing.
    pub fn with_ensure_namespace(mut self, ensure: bool) -> Self {
        self.ensure_namespace = ensure;
        self
    }

    pub fn api(&self) -> &dyn ClusterApi {
        self.api.as_ref()
    }

    /// Create every non-Secret document of a blueprint.
    pub async fn deploy_blueprint(
        &self,
        app_id: AppId,
        documents: &[ResourceDocument],
    ) -> DeployResult<DeployReport> {
        let namespace = app_namespace(app_id);
        let mut report = DeployReport {
            namespace: namespace.clone(),
            resources: Vec::new(),
        };

        let deployable: Vec<&ResourceDocument> = documents
            .iter()
            .filter(|d| !d.is_kind(ResourceKind::Secret))
            .collect();
        if deployable.is_empty() {
            debug!(app_id, "nothing to deploy");
            return Ok(report);
        }

        if self.ensure_namespace {
            self.ensure_namespace_exists(&namespace).await?;
        }

        for document in deployable {
            let name = document.name().ok_or_else(|| {
                DeployError::Deployment(format!(
                    "{} document has no metadata.name",
                    document.kind().unwrap_or("untyped")
                ))
            })?;
            let name = resource_name(app_id, name);
            let created = self
                .registry
                .deploy(self.api.as_ref(), document, &name, &namespace)
                .await?;
            report.resources.push(created);
        }

        info!(
            app_id,
            %namespace,
            resources = report.resources.len(),
            failed = report.failed().count(),
            "blueprint deployed"
        );
        Ok(report)
    }

    /// Create a single Pod under an explicit name, making sure its
    /// namespace exists first.
    pub async fn deploy_pod(
        &self,
        document: &ResourceDocument,
        name: &str,
        namespace: &str,
    ) -> DeployResult<CreatedResource> {
        if !document.is_kind(ResourceKind::Pod) {
            return Err(DeployError::Deployment(format!(
                "expected a Pod document, got {}",
                document.kind().unwrap_or("untyped")
            )));
        }
        self.ensure_namespace_exists(namespace).await?;

        let body = self.registry.build(document, name)?;
        Ok(create(self.api.as_ref(), &body, namespace).await)
    }

    async fn ensure_namespace_exists(&self, namespace: &str) -> DeployResult<()> {
        let existing = self.api.list_namespaces().await?;
        if existing.iter().any(|n| n == namespace) {
            return Ok(());
        }
        info!(%namespace, "creating namespace");
        self.api.create_namespace(&Namespace::new(namespace)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartops_blueprint::parse_manifest;
    use smartops_cluster::{ClusterCall, MemoryCluster};

    const SHOP: &str = r#"
apiVersion: v1
kind: Secret
metadata:
  name: creds
data:
  password: aHVudGVyMg==
---
apiVersion: v1
kind: Service
metadata:
  name: web
spec:
  ports:
  - port: 80
    targetPort: 8080
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 3
  template:
    metadata:
      labels:
        name: web
    spec:
      containers:
      - name: nginx
        image: nginx
        ports:
        - containerPort: 8080
"#;

    fn cluster(app_id: AppId) -> Arc<MemoryCluster> {
        Arc::new(MemoryCluster::new().with_namespace(&app_namespace(app_id)))
    }

    #[test]
    fn naming() {
        assert_eq!(app_namespace(4), "smartops-app-4");
        assert_eq!(resource_name(4, "web"), "4web");
    }

    #[tokio::test]
    async fn deploys_in_order_and_skips_secrets() {
        let api = cluster(1);
        let orchestrator = DeploymentOrchestrator::new(api.clone());
        let documents = parse_manifest(SHOP).unwrap();

        let report = orchestrator.deploy_blueprint(1, &documents).await.unwrap();

        assert_eq!(report.namespace, "smartops-app-1");
        let summary = report.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].kind, "Service");
        assert_eq!(summary[0].name, "1web");
        assert_eq!(summary[1].kind, "Deployment");
        assert!(summary.iter().all(|s| s.created));
        assert_eq!(
            report.outcome(),
            LaunchOutcome {
                created: vec!["1web".to_string(), "1web".to_string()],
                failed: vec![],
            }
        );
        assert!(
            api.object(ResourceKind::Deployment, Some("smartops-app-1"), "1web")
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn secret_only_blueprint_makes_no_calls() {
        let api = Arc::new(MemoryCluster::new());
        let orchestrator = DeploymentOrchestrator::new(api.clone()).with_ensure_namespace(true);
        let documents = parse_manifest(
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: creds\n",
        )
        .unwrap();

        let report = orchestrator.deploy_blueprint(1, &documents).await.unwrap();
        assert!(report.is_empty());
        assert!(api.calls().await.is_empty());
    }

    #[tokio::test]
    async fn refused_create_is_collected() {
        let api = cluster(2);
        api.fail_kind(ResourceKind::Service).await;
        let orchestrator = DeploymentOrchestrator::new(api.clone());

        let report = orchestrator
            .deploy_blueprint(2, &parse_manifest(SHOP).unwrap())
            .await
            .unwrap();

        let outcome = report.outcome();
        assert_eq!(outcome.created, vec!["2web".to_string()]);
        assert_eq!(outcome.failed, vec!["2web".to_string()]);
        assert_eq!(report.failed().next().map(|r| r.kind), Some(ResourceKind::Service));
    }

    #[tokio::test]
    async fn malformed_document_aborts_after_earlier_creates() {
        let api = cluster(3);
        let orchestrator = DeploymentOrchestrator::new(api.clone());
        let documents = parse_manifest(
            r#"
apiVersion: v1
kind: Service
metadata:
  name: db
spec: {}
---
apiVersion: apps/v1
kind: StatefulSet
metadata:
  name: db
spec:
  template:
    spec:
      containers:
      - name: pg
        image: postgres
"#,
        )
        .unwrap();

        let err = orchestrator.deploy_blueprint(3, &documents).await.unwrap_err();
        assert!(matches!(err, DeployError::Build(_)), "{err}");
        // The Service went out before the StatefulSet failed to build.
        assert_eq!(api.create_calls().await, 1);
    }

    #[tokio::test]
    async fn ensure_namespace_creates_it_once() {
        let api = Arc::new(MemoryCluster::new());
        let orchestrator = DeploymentOrchestrator::new(api.clone()).with_ensure_namespace(true);
        let documents = parse_manifest(SHOP).unwrap();

        orchestrator.deploy_blueprint(5, &documents).await.unwrap();
        assert_eq!(api.namespaces().await, vec!["smartops-app-5".to_string()]);

        let calls = api.calls().await;
        assert_eq!(calls[0], ClusterCall::ListNamespaces);
        assert_eq!(
            calls[1],
            ClusterCall::Create {
                kind: ResourceKind::Namespace,
                namespace: None,
                name: "smartops-app-5".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn missing_namespace_fails_every_create_without_ensure() {
        let api = Arc::new(MemoryCluster::new());
        let orchestrator = DeploymentOrchestrator::new(api.clone());

        let report = orchestrator
            .deploy_blueprint(6, &parse_manifest(SHOP).unwrap())
            .await
            .unwrap();
        assert_eq!(report.failed().count(), 2);
        assert!(report.outcome().created.is_empty());
    }

    #[tokio::test]
    async fn deploy_pod_rejects_other_kinds() {
        let orchestrator = DeploymentOrchestrator::new(Arc::new(MemoryCluster::new()));
        let documents = parse_manifest(SHOP).unwrap();
        let err = orchestrator
            .deploy_pod(&documents[1], "x", "ns")
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Deployment(_)));
    }
}
