//! Module manifests: the YAML a module ships to declare its capabilities.
//!
//! ```yaml
//! module:
//!   id: "docgen"
//!   version: "1.4.0"
//!   priority: 10
//!   capabilities:
//!     - id: "pdf.export"
//!       name: "PDF Export"
//!       version: "1.0.0"
//!       description: "Render documents to PDF"
//!       category: { id: "docs", label: "Documents" }
//!       metadata:
//!         licensing: { license: "MIT" }
//! ```
//!
//! The hosting module loader parses manifests and hands them to
//! [`CapabilityRegistry::register_module`](super::registry::CapabilityRegistry::register_module).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::capability::{Capability, Provider};
use super::entry::CapabilityEntryMetadata;
use crate::error::ManifestError;

/// One capability declared by a module, with optional entry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestCapability {
    #[serde(flatten)]
    pub capability: Capability,

    #[serde(default)]
    pub metadata: Option<CapabilityEntryMetadata>,
}

/// A module and the capabilities it provides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub id: String,
    pub version: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Provider priority applied to every capability of this module.
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub capabilities: Vec<ManifestCapability>,
}

/// Manifests are nested under a `module:` key.
#[derive(Debug, Deserialize)]
struct ModuleManifestWrapper {
    module: ModuleManifest,
}

impl ModuleManifest {
    /// Parse and validate a manifest from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ManifestError> {
        let wrapper: ModuleManifestWrapper = serde_yaml::from_str(yaml)?;
        let manifest = wrapper.module;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse a manifest from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        if self.id.trim().is_empty() {
            return Err(ManifestError::Validation("module id is required".into()));
        }
        if self.version.trim().is_empty() {
            return Err(ManifestError::Validation(format!(
                "module '{}' has no version",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        for declared in &self.capabilities {
            if !seen.insert(declared.capability.id.as_str()) {
                return Err(ManifestError::Validation(format!(
                    "module '{}' declares capability '{}' twice",
                    self.id, declared.capability.id
                )));
            }
        }
        Ok(())
    }

    /// Provider descriptor for this module's capabilities.
    pub fn provider(&self) -> Provider {
        Provider::new(&self.id, &self.version).with_priority(self.priority)
    }
}

/// Load every `.yaml` / `.yml` manifest under `dir` (recursive).
///
/// Files that fail to parse are logged and skipped. A missing directory
/// yields an empty list. Results are ordered by file path.
pub fn load_manifests_from_dir(dir: &Path) -> anyhow::Result<Vec<ModuleManifest>> {
    let mut files = Vec::new();
    collect_yaml_files(dir, &mut files)?;
    files.sort();

    let mut manifests = Vec::new();
    for path in files {
        match ModuleManifest::from_yaml_file(&path) {
            Ok(manifest) => manifests.push(manifest),
            Err(e) => {
                log::warn!("Failed to load module manifest from {}: {}", path.display(), e);
            }
        }
    }
    Ok(manifests)
}

fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading manifest directory {}", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("listing manifest directory {}", dir.display()))?
            .path();
        if path.is_dir() {
            collect_yaml_files(&path, out)?;
        } else if path
            .extension()
            .map_or(false, |ext| ext == "yaml" || ext == "yml")
        {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::capability::RequirementKind;

    const DOCGEN: &str = r#"
module:
  id: "docgen"
  version: "1.4.0"
  priority: 10
  capabilities:
    - id: "pdf.export"
      name: "PDF Export"
      version: "1.0.0"
      description: "Render documents to PDF"
      category:
        id: "docs"
        label: "Documents"
      tags: ["pdf", "export"]
      requirements:
        - kind: capability
          target: "storage.blob"
          version: "^2.0.0"
      metadata:
        documentation: "Converts HTML to PDF."
        licensing:
          license: "MIT"
    - id: "docx.export"
      name: "DOCX Export"
      version: "0.3.0"
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = ModuleManifest::from_yaml(DOCGEN).unwrap();
        assert_eq!(manifest.id, "docgen");
        assert_eq!(manifest.capabilities.len(), 2);

        let pdf = &manifest.capabilities[0];
        assert_eq!(pdf.capability.category_id(), Some("docs"));
        assert_eq!(pdf.capability.requirements[0].kind, RequirementKind::Capability);
        let meta = pdf.metadata.as_ref().unwrap();
        assert_eq!(meta.licensing.as_ref().unwrap().license, "MIT");
        assert!(manifest.capabilities[1].metadata.is_none());

        let provider = manifest.provider();
        assert_eq!(provider.module_id, "docgen");
        assert_eq!(provider.module_version, "1.4.0");
        assert_eq!(provider.priority, 10);
    }

    #[test]
    fn test_duplicate_capability_rejected() {
        let yaml = r#"
module:
  id: "dup"
  version: "1.0.0"
  capabilities:
    - { id: "a", name: "A", version: "1.0.0" }
    - { id: "a", name: "A again", version: "1.0.1" }
"#;
        let err = ModuleManifest::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ManifestError::Validation(_)));
    }

    #[test]
    fn test_load_directory_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("billing");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("docgen.yaml"), DOCGEN).unwrap();
        std::fs::write(
            nested.join("stripe.yml"),
            "module:\n  id: stripe\n  version: 2.0.0\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "module: [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let manifests = load_manifests_from_dir(dir.path()).unwrap();
        let ids: Vec<_> = manifests.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["stripe", "docgen"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let manifests = load_manifests_from_dir(Path::new("/nonexistent/manifests")).unwrap();
        assert!(manifests.is_empty());
    }
}
