//! smartops-cluster — cluster client for SmartOps.
//!
//! - [`registry`]: the closed table from resource kind to builder, and
//!   the build-then-create dispatch used by the deploy pipeline.
//! - [`resources`]: typed bodies in the cluster's wire format.
//! - [`api`]: the [`ClusterApi`] trait, with an HTTP backend ([`rest`])
//!   and an in-memory one ([`memory`]).

pub mod api;
pub mod error;
pub mod memory;
pub mod registry;
pub mod resources;
pub mod rest;

pub use api::{ApiResult, ClusterApi};
pub use error::{BuildError, ClusterApiError};
pub use memory::{ClusterCall, MemoryCluster};
pub use registry::{CreatedResource, ResourceBody, ResourceBuilder, ResourceKindRegistry, create};
pub use rest::HttpClusterApi;
