//! Capability and provider definitions: what a module declares it offers.
//!
//! A capability is the unit of pluggable functionality. It declares:
//! - A unique id, human name, description and semantic version
//! - An optional category used for grouping and discovery
//! - Requirements on other capabilities, modules, services or resources
//! - The interfaces it satisfies
//!
//! The [`Provider`] describes which module (and module version) supplies a
//! capability. Both are handed to the registry by the hosting module loader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A declared unit of functionality a module provides.
///
/// Example YAML (inside a module manifest):
/// ```yaml
/// - id: "pdf.export"
///   name: "PDF Export"
///   version: "1.0.0"
///   description: "Render documents to PDF"
///   category: { id: "docs", label: "Documents" }
///   tags: ["export", "pdf"]
///   requirements:
///     - kind: capability
///       target: "storage.blob"
///       version: "^2.0.0"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    /// Unique identifier (e.g. `"pdf.export"`).
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// What this capability does.
    #[serde(default)]
    pub description: String,

    /// Semantic version.
    pub version: String,

    /// Optional grouping category.
    #[serde(default)]
    pub category: Option<CapabilityCategory>,

    /// Searchable tags, merged into the entry metadata at registration.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Capability-level requirements.
    #[serde(default)]
    pub requirements: Vec<CapabilityRequirement>,

    /// Interfaces this capability satisfies.
    #[serde(default)]
    pub interfaces: Vec<CapabilityInterfaceDef>,
}

/// Category a capability belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityCategory {
    pub id: String,
    pub label: String,
}

impl CapabilityCategory {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// What a requirement points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    /// Another registered capability; tracked as an entry dependency.
    Capability,
    /// A module that must be loaded.
    Module,
    /// An external service (database, queue, third-party API).
    Service,
    /// A host resource (memory, storage quota, ...).
    Resource,
}

/// A single requirement declared by a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityRequirement {
    pub kind: RequirementKind,

    /// Id of the required capability, module, service or resource.
    pub target: String,

    /// Version constraint (e.g. `"^2.0.0"`); absent means any version.
    #[serde(default)]
    pub version: Option<String>,

    /// Optional requirements never block composition or discovery.
    #[serde(default)]
    pub optional: bool,
}

impl CapabilityRequirement {
    /// Requirement on another capability.
    pub fn capability(target: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            kind: RequirementKind::Capability,
            target: target.into(),
            version: version.map(String::from),
            optional: false,
        }
    }
}

/// An interface a capability satisfies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInterfaceDef {
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    /// Method names exposed through this interface.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Free-form schema description (JSON Schema, OpenAPI fragment, ...).
    #[serde(default)]
    pub schema: HashMap<String, Value>,
}

impl Capability {
    /// Create a capability with the required fields; everything else empty.
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: version.into(),
            category: None,
            tags: Vec::new(),
            requirements: Vec::new(),
            interfaces: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.category = Some(CapabilityCategory::new(id, label));
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_requirement(mut self, requirement: CapabilityRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn with_interface(mut self, interface: CapabilityInterfaceDef) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Category id, if any.
    pub fn category_id(&self) -> Option<&str> {
        self.category.as_ref().map(|c| c.id.as_str())
    }

    /// Requirements that point at other capabilities.
    pub fn capability_requirements(&self) -> impl Iterator<Item = &CapabilityRequirement> {
        self.requirements
            .iter()
            .filter(|r| r.kind == RequirementKind::Capability)
    }
}

/// Lifecycle status of a provider module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    #[default]
    Active,
    Inactive,
    Deprecated,
    Removed,
}

/// The module (and module version) supplying a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub module_id: String,
    pub module_version: String,

    #[serde(default)]
    pub status: ProviderStatus,

    /// Higher priority wins ties at discovery time.
    #[serde(default)]
    pub priority: i32,

    #[serde(default = "Utc::now")]
    pub registered_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    pub fn new(module_id: impl Into<String>, module_version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            module_id: module_id.into(),
            module_version: module_version.into(),
            status: ProviderStatus::Active,
            priority: 0,
            registered_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: ProviderStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_fields() {
        let cap = Capability::new("pdf.export", "PDF Export", "1.0.0")
            .with_description("Render documents to PDF")
            .with_category("docs", "Documents")
            .with_tags(["pdf", "export"])
            .with_requirement(CapabilityRequirement::capability("storage.blob", Some("^2.0.0")));

        assert_eq!(cap.category_id(), Some("docs"));
        assert_eq!(cap.tags, vec!["pdf", "export"]);
        assert_eq!(cap.capability_requirements().count(), 1);
    }

    #[test]
    fn test_capability_json_shape() {
        let cap = Capability::new("pdf.export", "PDF Export", "1.0.0");
        let json = serde_json::to_value(&cap).unwrap();
        assert_eq!(json["id"], "pdf.export");
        assert!(json["requirements"].as_array().unwrap().is_empty());

        let provider = Provider::new("docgen", "1.0.0").with_priority(5);
        let json = serde_json::to_value(&provider).unwrap();
        assert_eq!(json["moduleId"], "docgen");
        assert_eq!(json["status"], "active");
        assert_eq!(json["priority"], 5);
    }

    #[test]
    fn test_requirement_kind_parses_from_yaml() {
        let yaml = r#"
kind: service
target: "postgres"
optional: true
"#;
        let req: CapabilityRequirement = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(req.kind, RequirementKind::Service);
        assert!(req.optional);
        assert!(req.version.is_none());
    }
}
