//! Structural validation and entrypoint extraction.

use crate::document::{ResourceDocument, ResourceKind};
use crate::error::{BlueprintError, BlueprintResult};

/// Keys every document must carry.
pub const REQUIRED_KEYS: [&str; 3] = ["apiVersion", "kind", "metadata"];

/// Validate every document and collect the entrypoints (Service names).
///
/// Stops at the first violation.
pub fn validate_documents(documents: &[ResourceDocument]) -> BlueprintResult<Vec<String>> {
    let mut entrypoints = Vec::new();
    for document in documents {
        if let Some(entrypoint) = validate_document(document)? {
            entrypoints.push(entrypoint);
        }
    }
    Ok(entrypoints)
}

/// Validate one document. Returns its name when it is an entrypoint.
pub fn validate_document(document: &ResourceDocument) -> BlueprintResult<Option<String>> {
    let has_required = REQUIRED_KEYS.iter().all(|key| document.contains(key));
    let kind = match document.kind() {
        Some(kind) if has_required => kind,
        _ => return Err(requirements_not_met()),
    };

    // Secrets carry opaque material, not a resource template.
    if kind != ResourceKind::Secret.as_str() && !document.contains("spec") {
        return Err(requirements_not_met());
    }

    if kind == ResourceKind::Service.as_str() {
        let name = document.name().ok_or_else(|| {
            BlueprintError::Validation("Service name is missing in metadata".to_string())
        })?;
        return Ok(Some(name.to_string()));
    }

    Ok(None)
}

fn requirements_not_met() -> BlueprintError {
    BlueprintError::Validation("not all requirements met".to_string())
}
