//! smartops-blueprint — blueprint ingestion for SmartOps.
//!
//! A blueprint is a multi-document manifest describing an application's
//! deployable components. This crate turns the raw text into a validated,
//! indexed document set:
//!
//! ```text
//! manifest text ──► manifest::parse_manifest   (split on `---`, decode YAML)
//!               ──► validate::validate_documents (required keys, entrypoints)
//!               ──► topology::extract_topology   (service → replica summary)
//!               ──► AnalyzedBlueprint
//! ```
//!
//! Nothing here touches storage or the cluster; callers persist the
//! [`AnalyzedBlueprint`] and hand its documents to the deploy pipeline.

pub mod document;
pub mod error;
pub mod manifest;
pub mod plan;
pub mod topology;
pub mod validate;

pub use document::{ResourceDocument, ResourceKind, UnknownKind};
pub use error::{BlueprintError, BlueprintResult};
pub use manifest::parse_manifest;
pub use plan::{ContainerPlan, ControllerPlan, base_plan};
pub use topology::{ResourceCounts, Topology, TopologyEntry, extract_topology, resource_counts};
pub use validate::validate_documents;

use tracing::debug;

/// A blueprint that passed parsing and validation, with its derived data.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedBlueprint {
    /// Documents in input order.
    pub documents: Vec<ResourceDocument>,
    /// The original text, kept for round-trip retrieval.
    pub raw: String,
    /// Names of Service documents.
    pub entrypoints: Vec<String>,
    pub topology: Topology,
    pub counts: ResourceCounts,
}

/// Run the full ingestion pipeline over raw manifest text.
///
/// All-or-nothing: the first parse or validation failure anywhere in the
/// text is returned and no partial result is produced.
pub fn analyze(text: &str) -> BlueprintResult<AnalyzedBlueprint> {
    let documents = parse_manifest(text)?;
    let entrypoints = validate_documents(&documents)?;
    let topology = extract_topology(&documents)?;
    let counts = resource_counts(&documents, &topology)?;

    debug!(
        documents = documents.len(),
        entrypoints = entrypoints.len(),
        services = counts.services,
        pods = counts.pods,
        containers = counts.containers,
        "blueprint analyzed"
    );

    Ok(AnalyzedBlueprint {
        documents,
        raw: text.to_string(),
        entrypoints,
        topology,
        counts,
    })
}
