//! Cluster API client over plain HTTP/1.1.
//!
//! Talks to a Kubernetes-style REST endpoint, typically `kubectl proxy`
//! or an in-cluster API address. One connection per call, bounded by a
//! per-call timeout; no retries.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{ApiGroup, ApiResult, ClusterApi, collection_path};
use crate::error::ClusterApiError;
use crate::resources::{Deployment, Namespace, Pod, ReplicationController, Service, StatefulSet};

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpClusterApi {
    /// `host:port` of the API endpoint.
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpClusterApi {
    /// Accepts `host:port` or `http://host:port`. Other schemes are
    /// refused here since the client only speaks plain HTTP.
    pub fn new(endpoint: &str) -> Result<Self, ClusterApiError> {
        let invalid = |reason: String| ClusterApiError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };
        let authority = match endpoint.split_once("://") {
            None => endpoint,
            Some(("http", rest)) => rest,
            Some((scheme, _)) => {
                return Err(invalid(format!("unsupported scheme {scheme}")));
            }
        }
        .trim_end_matches('/');
        if authority.is_empty() || authority.contains('/') {
            return Err(invalid("expected host:port".to_string()));
        }

        Ok(Self {
            endpoint: authority.to_string(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get(&self, path: &str) -> ApiResult {
        self.send("GET", path, None).await
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> ApiResult {
        let payload =
            serde_json::to_vec(body).map_err(|e| ClusterApiError::Decode(e.to_string()))?;
        self.send("POST", path, Some(payload)).await
    }

    async fn send(&self, method: &str, path: &str, payload: Option<Vec<u8>>) -> ApiResult {
        match tokio::time::timeout(self.timeout, self.exchange(method, path, payload)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%method, %path, timeout = ?self.timeout, "cluster api call timed out");
                Err(ClusterApiError::Timeout(self.timeout))
            }
        }
    }

    async fn exchange(&self, method: &str, path: &str, payload: Option<Vec<u8>>) -> ApiResult {
        let uri = format!("http://{}{path}", self.endpoint);
        let connect_error = |reason: String| ClusterApiError::Connect {
            endpoint: self.endpoint.clone(),
            reason,
        };

        let stream = tokio::net::TcpStream::connect(&self.endpoint)
            .await
            .map_err(|e| connect_error(e.to_string()))?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| connect_error(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "cluster api connection closed with error");
            }
        });

        let mut builder = http::Request::builder()
            .method(method)
            .uri(path)
            .header("host", &self.endpoint)
            .header("user-agent", "smartops/0.1")
            .header("accept", "application/json");
        if payload.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        if let Some(token) = &self.token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = Full::new(Bytes::from(payload.unwrap_or_default()));
        let req = builder
            .body(body)
            .map_err(|e| ClusterApiError::Rejected(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| connect_error(e.to_string()))?;
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ClusterApiError::Decode(e.to_string()))?
            .to_bytes();

        if !status.is_success() {
            let message = error_message(&bytes);
            debug!(%method, %uri, %status, %message, "cluster api call failed");
            return Err(ClusterApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        debug!(%method, %uri, %status, "cluster api call succeeded");
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ClusterApiError::Decode(e.to_string()))
    }
}

/// The `message` of a Kubernetes `Status` body, or the raw body text.
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}

/// Names from a `NamespaceList` body.
fn namespace_names(list: &Value) -> Result<Vec<String>, ClusterApiError> {
    let items = list
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| ClusterApiError::Decode("namespace list has no items".to_string()))?;
    Ok(items
        .iter()
        .filter_map(|item| item.pointer("/metadata/name").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

#[async_trait]
impl ClusterApi for HttpClusterApi {
    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterApiError> {
        let list = self.get("/api/v1/namespaces").await?;
        namespace_names(&list)
    }

    async fn create_namespace(&self, body: &Namespace) -> ApiResult {
        self.post("/api/v1/namespaces", body).await
    }

    async fn create_pod(&self, namespace: &str, body: &Pod) -> ApiResult {
        self.post(&collection_path(ApiGroup::Core, namespace, "pods"), body)
            .await
    }

    async fn create_service(&self, namespace: &str, body: &Service) -> ApiResult {
        self.post(&collection_path(ApiGroup::Core, namespace, "services"), body)
            .await
    }

    async fn create_replication_controller(
        &self,
        namespace: &str,
        body: &ReplicationController,
    ) -> ApiResult {
        let path = collection_path(ApiGroup::Core, namespace, "replicationcontrollers");
        self.post(&path, body).await
    }

    async fn create_deployment(&self, namespace: &str, body: &Deployment) -> ApiResult {
        self.post(&collection_path(ApiGroup::Apps, namespace, "deployments"), body)
            .await
    }

    async fn create_stateful_set(&self, namespace: &str, body: &StatefulSet) -> ApiResult {
        self.post(&collection_path(ApiGroup::Apps, namespace, "statefulsets"), body)
            .await
    }
}
