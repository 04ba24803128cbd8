//! Resource kind registry — maps a document's `kind` to the builder that
//! turns it into a typed create call.
//!
//! The table is closed: an unknown kind is an explicit
//! [`BuildError::UnsupportedKind`]. Secrets have no builder; they are
//! provisioned out of band and the orchestrator skips them.
//!
//! Building and creating are separate steps. A build failure means the
//! document itself is unusable and is returned as an error; a refused
//! create is logged and reported in [`CreatedResource::result`] so the
//! caller decides whether to continue.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use smartops_blueprint::{ResourceDocument, ResourceKind, UnknownKind};
use tracing::{debug, error};

use crate::api::{ApiResult, ClusterApi};
use crate::error::{BuildError, ClusterApiError};
use crate::resources::*;

/// Replica count for controllers that do not set one.
pub const DEFAULT_REPLICAS: u32 = 1;

const CORE_API: &str = "v1";
const APPS_API: &str = "apps/v1";

// ── Bodies ────────────────────────────────────────────────────────

/// A typed create call, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceBody {
    Namespace(Namespace),
    Pod(Pod),
    Service(Service),
    ReplicationController(ReplicationController),
    Deployment(Deployment),
    StatefulSet(StatefulSet),
}

impl ResourceBody {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceBody::Namespace(_) => ResourceKind::Namespace,
            ResourceBody::Pod(_) => ResourceKind::Pod,
            ResourceBody::Service(_) => ResourceKind::Service,
            ResourceBody::ReplicationController(_) => ResourceKind::ReplicationController,
            ResourceBody::Deployment(_) => ResourceKind::Deployment,
            ResourceBody::StatefulSet(_) => ResourceKind::StatefulSet,
        }
    }

    fn metadata(&self) -> &ObjectMeta {
        match self {
            ResourceBody::Namespace(b) => &b.metadata,
            ResourceBody::Pod(b) => &b.metadata,
            ResourceBody::Service(b) => &b.metadata,
            ResourceBody::ReplicationController(b) => &b.metadata,
            ResourceBody::Deployment(b) => &b.metadata,
            ResourceBody::StatefulSet(b) => &b.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Issue the create call. Namespaces ignore `namespace`.
    pub async fn create(&self, api: &dyn ClusterApi, namespace: &str) -> ApiResult {
        match self {
            ResourceBody::Namespace(b) => api.create_namespace(b).await,
            ResourceBody::Pod(b) => api.create_pod(namespace, b).await,
            ResourceBody::Service(b) => api.create_service(namespace, b).await,
            ResourceBody::ReplicationController(b) => {
                api.create_replication_controller(namespace, b).await
            }
            ResourceBody::Deployment(b) => api.create_deployment(namespace, b).await,
            ResourceBody::StatefulSet(b) => api.create_stateful_set(namespace, b).await,
        }
    }
}

/// The outcome of creating one resource.
#[derive(Debug, Clone)]
pub struct CreatedResource {
    pub kind: ResourceKind,
    pub name: String,
    pub result: Result<Value, ClusterApiError>,
}

impl CreatedResource {
    pub fn is_created(&self) -> bool {
        self.result.is_ok()
    }
}

// ── Builders ──────────────────────────────────────────────────────

pub trait ResourceBuilder: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Translate `document` into a create call for a resource named `name`.
    fn build(&self, document: &ResourceDocument, name: &str) -> Result<ResourceBody, BuildError>;
}

fn malformed(kind: ResourceKind, name: &str, reason: impl Into<String>) -> BuildError {
    BuildError::Malformed {
        kind: kind.as_str(),
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Decode the sub-tree at `path`, failing if it is absent.
fn section<T: DeserializeOwned>(
    document: &ResourceDocument,
    path: &[&str],
    kind: ResourceKind,
    name: &str,
) -> Result<T, BuildError> {
    let value = document
        .lookup(path)
        .ok_or_else(|| malformed(kind, name, format!("missing {}", path.join("."))))?;
    T::deserialize(value).map_err(|e| malformed(kind, name, format!("{}: {e}", path.join("."))))
}

/// Decode the sub-tree at `path` if it is present and not null.
fn optional_section<T: DeserializeOwned>(
    document: &ResourceDocument,
    path: &[&str],
    kind: ResourceKind,
    name: &str,
) -> Result<Option<T>, BuildError> {
    match document.lookup(path) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => section(document, path, kind, name).map(Some),
    }
}

fn replicas(document: &ResourceDocument, kind: ResourceKind, name: &str) -> Result<u32, BuildError> {
    Ok(optional_section(document, &["spec", "replicas"], kind, name)?.unwrap_or(DEFAULT_REPLICAS))
}

/// `spec.selector` as a label selector. Accepts `{matchLabels: {..}}` or a
/// flat label map, and falls back to the template labels.
fn label_selector(
    document: &ResourceDocument,
    template: &PodTemplateSpec,
    kind: ResourceKind,
    name: &str,
) -> Result<LabelSelector, BuildError> {
    match document.lookup(&["spec", "selector"]) {
        None | Some(Value::Null) => Ok(LabelSelector {
            match_labels: template.labels(),
        }),
        Some(selector) if selector.get("matchLabels").is_some() => {
            section(document, &["spec", "selector"], kind, name)
        }
        Some(_) => Ok(LabelSelector {
            match_labels: section(document, &["spec", "selector"], kind, name)?,
        }),
    }
}

struct NamespaceBuilder;
struct PodBuilder;
struct ServiceBuilder;
struct ReplicationControllerBuilder;
struct DeploymentBuilder;
struct StatefulSetBuilder;

impl ResourceBuilder for NamespaceBuilder {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Namespace
    }

    fn build(&self, _document: &ResourceDocument, name: &str) -> Result<ResourceBody, BuildError> {
        Ok(ResourceBody::Namespace(Namespace::new(name)))
    }
}

impl ResourceBuilder for PodBuilder {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Pod
    }

    fn build(&self, document: &ResourceDocument, name: &str) -> Result<ResourceBody, BuildError> {
        let spec: PodSpec = section(document, &["spec"], self.kind(), name)?;
        Ok(ResourceBody::Pod(Pod {
            api_version: CORE_API.to_string(),
            kind: self.kind().as_str().to_string(),
            metadata: ObjectMeta::named(name),
            spec,
        }))
    }
}

impl ResourceBuilder for ServiceBuilder {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Service
    }

    fn build(&self, document: &ResourceDocument, name: &str) -> Result<ResourceBody, BuildError> {
        let spec: ServiceSpec = section(document, &["spec"], self.kind(), name)?;
        Ok(ResourceBody::Service(Service {
            api_version: CORE_API.to_string(),
            kind: self.kind().as_str().to_string(),
            metadata: ObjectMeta::named(name),
            spec,
        }))
    }
}

impl ResourceBuilder for ReplicationControllerBuilder {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ReplicationController
    }

    fn build(&self, document: &ResourceDocument, name: &str) -> Result<ResourceBody, BuildError> {
        let kind = self.kind();
        let template: PodTemplateSpec = section(document, &["spec", "template"], kind, name)?;
        Ok(ResourceBody::ReplicationController(ReplicationController {
            api_version: CORE_API.to_string(),
            kind: kind.as_str().to_string(),
            metadata: ObjectMeta::named(name),
            spec: ReplicationControllerSpec {
                replicas: replicas(document, kind, name)?,
                selector: optional_section(document, &["spec", "selector"], kind, name)?,
                template,
            },
        }))
    }
}

impl ResourceBuilder for DeploymentBuilder {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Deployment
    }

    fn build(&self, document: &ResourceDocument, name: &str) -> Result<ResourceBody, BuildError> {
        let kind = self.kind();
        let template: PodTemplateSpec = section(document, &["spec", "template"], kind, name)?;
        Ok(ResourceBody::Deployment(Deployment {
            api_version: APPS_API.to_string(),
            kind: kind.as_str().to_string(),
            metadata: ObjectMeta::named(name),
            spec: DeploymentSpec {
                replicas: replicas(document, kind, name)?,
                selector: label_selector(document, &template, kind, name)?,
                template,
            },
        }))
    }
}

impl ResourceBuilder for StatefulSetBuilder {
    fn kind(&self) -> ResourceKind {
        ResourceKind::StatefulSet
    }

    fn build(&self, document: &ResourceDocument, name: &str) -> Result<ResourceBody, BuildError> {
        let kind = self.kind();
        let template: PodTemplateSpec = section(document, &["spec", "template"], kind, name)?;
        Ok(ResourceBody::StatefulSet(StatefulSet {
            api_version: APPS_API.to_string(),
            kind: kind.as_str().to_string(),
            metadata: ObjectMeta::named(name),
            spec: StatefulSetSpec {
                service_name: section(document, &["spec", "serviceName"], kind, name)?,
                replicas: replicas(document, kind, name)?,
                selector: label_selector(document, &template, kind, name)?,
                template,
            },
        }))
    }
}

// ── Registry ──────────────────────────────────────────────────────

static BUILDERS: [&dyn ResourceBuilder; 6] = [
    &NamespaceBuilder,
    &PodBuilder,
    &ServiceBuilder,
    &ReplicationControllerBuilder,
    &DeploymentBuilder,
    &StatefulSetBuilder,
];

/// Static lookup from resource kind to builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceKindRegistry;

impl ResourceKindRegistry {
    /// Kinds that have a builder.
    pub fn supported(&self) -> impl Iterator<Item = ResourceKind> {
        BUILDERS.iter().map(|b| b.kind())
    }

    pub fn builder(&self, kind: ResourceKind) -> Result<&'static dyn ResourceBuilder, BuildError> {
        BUILDERS
            .iter()
            .copied()
            .find(|b| b.kind() == kind)
            .ok_or_else(|| BuildError::UnsupportedKind(UnknownKind(kind.as_str().to_string())))
    }

    /// Look up by the raw `kind` tag of a document.
    pub fn lookup(&self, tag: &str) -> Result<&'static dyn ResourceBuilder, BuildError> {
        let kind: ResourceKind = tag.parse()?;
        self.builder(kind)
    }

    /// Build the create call for `document` under the given resource name.
    pub fn build(&self, document: &ResourceDocument, name: &str) -> Result<ResourceBody, BuildError> {
        let tag = document.kind().unwrap_or_default();
        self.lookup(tag)?.build(document, name)
    }

    /// Build and create one resource.
    ///
    /// Build failures are returned as errors. A refused create is logged
    /// and carried in the returned [`CreatedResource`].
    pub async fn deploy(
        &self,
        api: &dyn ClusterApi,
        document: &ResourceDocument,
        name: &str,
        namespace: &str,
    ) -> Result<CreatedResource, BuildError> {
        let body = self.build(document, name)?;
        Ok(create(api, &body, namespace).await)
    }
}

/// Send one built body, logging a refusal.
pub async fn create(api: &dyn ClusterApi, body: &ResourceBody, namespace: &str) -> CreatedResource {
    let kind = body.kind();
    let name = body.name().to_string();
    let result = body.create(api, namespace).await;
    match &result {
        Ok(_) => debug!(kind = kind.as_str(), %name, %namespace, "resource created"),
        Err(e) => error!(
            kind = kind.as_str(),
            %name,
            %namespace,
            error = %e,
            "exception caught when creating resource"
        ),
    }
    CreatedResource { kind, name, result }
}
