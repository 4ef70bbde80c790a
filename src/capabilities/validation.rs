//! Validation and conflict detection for proposed registrations.
//!
//! Runs before any store mutation. Errors and conflicts abort registration;
//! warnings are passed back to the caller alongside a successful result.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::capability::{Capability, Provider};
use super::store::CapabilityStore;
use super::version::{Version, VersionConstraint};
use crate::error::{RegistryError, StoreError};

/// Outcome of structural validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Class of a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// The capability id is already registered.
    DuplicateId,
    /// Another id already uses the same capability name. Not produced yet.
    NameCollision,
    /// A dependency is registered at an incompatible version. Not produced yet.
    VersionIncompatibility,
}

/// A collision that blocks registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityConflict {
    pub kind: ConflictKind,
    pub message: String,
    /// Structured details (colliding id, current provider, ...).
    #[serde(default)]
    pub details: Option<Value>,
}

/// Check a proposed capability and provider for structural completeness.
pub fn validate(capability: &Capability, provider: &Provider) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if capability.id.trim().is_empty() {
        errors.push("Capability ID is required".to_string());
    }
    if capability.name.trim().is_empty() {
        errors.push("Capability name is required".to_string());
    }
    if capability.description.trim().is_empty() {
        warnings.push("Capability description is recommended".to_string());
    }
    if !capability.version.is_empty() && !Version::is_strict_semver(&capability.version) {
        warnings.push(format!(
            "Capability version '{}' is not a major.minor.patch version",
            capability.version
        ));
    }
    for req in &capability.requirements {
        if req.target.trim().is_empty() {
            errors.push("Requirement target is required".to_string());
        }
        if let Some(constraint) = &req.version {
            if let Err(e) = VersionConstraint::parse(constraint) {
                errors.push(format!("Requirement '{}': {}", req.target, e));
            }
        }
    }

    if provider.module_id.trim().is_empty() {
        errors.push("Provider module ID is required".to_string());
    }
    if provider.module_version.trim().is_empty() {
        errors.push("Provider module version is required".to_string());
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Find collisions between `capability` and the current store contents.
pub async fn detect_conflicts(
    store: &dyn CapabilityStore,
    capability: &Capability,
) -> Result<Vec<CapabilityConflict>, StoreError> {
    let mut conflicts = Vec::new();

    if let Some(existing) = store.get(&capability.id).await? {
        conflicts.push(CapabilityConflict {
            kind: ConflictKind::DuplicateId,
            message: RegistryError::AlreadyExists(capability.id.clone()).to_string(),
            details: Some(json!({
                "capabilityId": capability.id,
                "existingProvider": existing.provider.module_id,
                "existingVersion": existing.capability.version,
            })),
        });
    }

    Ok(conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::capability::CapabilityRequirement;
    use crate::capabilities::entry::CapabilityRegistryEntry;
    use crate::capabilities::store::InMemoryCapabilityStore;
    use chrono::Utc;

    #[test]
    fn test_missing_required_fields() {
        let report = validate(&Capability::new("", "", "1.0.0"), &Provider::new("", ""));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 4);
        assert!(report.errors.contains(&"Capability ID is required".to_string()));
        assert!(report
            .errors
            .contains(&"Provider module version is required".to_string()));
    }

    #[test]
    fn test_missing_description_is_warning() {
        let report = validate(
            &Capability::new("pdf.export", "PDF Export", "1.0.0"),
            &Provider::new("docgen", "1.0.0"),
        );
        assert!(report.valid);
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings, vec!["Capability description is recommended"]);
    }

    #[test]
    fn test_bad_requirement_constraint_is_error() {
        let cap = Capability::new("pdf.export", "PDF Export", "1.0")
            .with_description("Render PDFs")
            .with_requirement(CapabilityRequirement::capability("storage.blob", Some(">>2")));
        let report = validate(&cap, &Provider::new("docgen", "1.0.0"));
        assert!(!report.valid);
        assert!(report.errors[0].contains("storage.blob"));
        assert!(report.warnings[0].contains("not a major.minor.patch"));
    }

    #[tokio::test]
    async fn test_duplicate_id_conflict() {
        let store = InMemoryCapabilityStore::new();
        let cap = Capability::new("pdf.export", "PDF Export", "1.0.0");
        assert!(detect_conflicts(&store, &cap).await.unwrap().is_empty());

        store
            .put(CapabilityRegistryEntry::new(
                cap.clone(),
                Provider::new("docgen", "1.0.0"),
                vec![],
                Utc::now(),
            ))
            .await
            .unwrap();

        let conflicts = detect_conflicts(&store, &cap).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::DuplicateId);
        assert!(conflicts[0].message.contains("already exists"));
        assert_eq!(
            conflicts[0].details.as_ref().unwrap()["existingProvider"],
            "docgen"
        );
    }
}
