//! Capability compositions: named, ordered pipelines of registered capabilities.
//!
//! A composition is validated when it is created: every referenced capability
//! must be registered and `available`. Compositions are not touched when a
//! referenced capability is later unregistered or changes status; callers
//! re-check with [`CompositionManager::check`] before running one.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::store::CapabilityStore;
use crate::error::{RegistryError, RegistryResult};

/// Role of a capability inside a composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionRole {
    Primary,
    Secondary,
    Supporting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionStatus {
    #[default]
    Active,
    Inactive,
    Deprecated,
}

/// What an external composition dependency points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionDependencyKind {
    Capability,
    Module,
    Service,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    #[default]
    Unresolved,
    Failed,
}

/// One step of a composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityCompositionEntry {
    pub capability_id: String,
    pub role: CompositionRole,

    /// Per-step configuration handed to the capability.
    #[serde(default)]
    pub configuration: HashMap<String, Value>,

    /// Other capability ids in the same composition this step needs.
    #[serde(default)]
    pub dependencies: Vec<String>,

    pub order: u32,
}

impl CapabilityCompositionEntry {
    pub fn new(capability_id: impl Into<String>, role: CompositionRole, order: u32) -> Self {
        Self {
            capability_id: capability_id.into(),
            role,
            configuration: HashMap::new(),
            dependencies: Vec::new(),
            order,
        }
    }
}

/// A dependency on something outside the composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityCompositionDependency {
    pub kind: CompositionDependencyKind,
    pub target_id: String,
    #[serde(default)]
    pub version_constraint: Option<String>,
    #[serde(default)]
    pub status: ResolutionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityComposition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub capabilities: Vec<CapabilityCompositionEntry>,
    #[serde(default)]
    pub dependencies: Vec<CapabilityCompositionDependency>,
    #[serde(default)]
    pub status: CompositionStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl CapabilityComposition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            capabilities: Vec::new(),
            dependencies: Vec::new(),
            status: CompositionStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn with_entry(mut self, entry: CapabilityCompositionEntry) -> Self {
        self.capabilities.push(entry);
        self
    }

    pub fn capability_ids(&self) -> impl Iterator<Item = &str> {
        self.capabilities.iter().map(|e| e.capability_id.as_str())
    }
}

/// Outcome of creating or re-checking a composition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionResult {
    pub success: bool,
    pub composition_id: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CompositionResult {
    fn failure(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            composition_id: None,
            errors,
            warnings,
        }
    }
}

/// Structural checks that need no store access.
fn validate_structure(composition: &CapabilityComposition) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if composition.id.trim().is_empty() {
        errors.push("Composition ID is required".to_string());
    }
    if composition.name.trim().is_empty() {
        errors.push("Composition name is required".to_string());
    }
    if composition.capabilities.is_empty() {
        errors.push("Composition must include at least one capability".to_string());
    }

    let mut seen = HashSet::new();
    for entry in &composition.capabilities {
        if entry.capability_id.trim().is_empty() {
            errors.push("Composition entry capability ID is required".to_string());
        } else if !seen.insert(entry.capability_id.as_str()) {
            errors.push(format!(
                "Capability '{}' appears more than once in composition",
                entry.capability_id
            ));
        }
    }
    for entry in &composition.capabilities {
        for dep in &entry.dependencies {
            if !seen.contains(dep.as_str()) {
                warnings.push(format!(
                    "Capability '{}' depends on '{}', which is not part of the composition",
                    entry.capability_id, dep
                ));
            }
        }
    }

    (errors, warnings)
}

/// Collect an error for every referenced capability that is missing or not available.
async fn availability_errors(
    store: &dyn CapabilityStore,
    composition: &CapabilityComposition,
) -> RegistryResult<Vec<String>> {
    let mut errors = Vec::new();
    for capability_id in composition.capability_ids() {
        match store.get(capability_id).await? {
            None => errors.push(RegistryError::NotFound(capability_id.to_string()).to_string()),
            Some(entry) if !entry.is_available() => errors.push(
                RegistryError::Unavailable {
                    id: capability_id.to_string(),
                    status: entry.state().to_string(),
                }
                .to_string(),
            ),
            Some(_) => {}
        }
    }
    Ok(errors)
}

/// Validates and stores compositions.
#[derive(Debug, Default)]
pub struct CompositionManager {
    compositions: RwLock<HashMap<String, CapabilityComposition>>,
}

impl CompositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a composition. All-or-nothing: any structural error,
    /// duplicate id, or missing/unavailable capability stores nothing.
    pub async fn create(
        &self,
        store: &dyn CapabilityStore,
        mut composition: CapabilityComposition,
    ) -> CompositionResult {
        let (mut errors, warnings) = validate_structure(&composition);
        if !errors.is_empty() {
            return CompositionResult::failure(errors, warnings);
        }

        if self.compositions.read().contains_key(&composition.id) {
            errors.push(RegistryError::CompositionExists(composition.id.clone()).to_string());
            return CompositionResult::failure(errors, warnings);
        }

        match availability_errors(store, &composition).await {
            Ok(unavailable) => errors.extend(unavailable),
            Err(e) => errors.push(e.to_string()),
        }
        if !errors.is_empty() {
            log::info!(
                "Rejected composition '{}': {}",
                composition.id,
                errors.join("; ")
            );
            return CompositionResult::failure(errors, warnings);
        }

        composition.capabilities.sort_by_key(|e| e.order);
        let id = composition.id.clone();
        {
            let mut compositions = self.compositions.write();
            if compositions.contains_key(&id) {
                errors.push(RegistryError::CompositionExists(id).to_string());
                return CompositionResult::failure(errors, warnings);
            }
            compositions.insert(id.clone(), composition);
        }
        log::info!("Created composition '{}'", id);

        CompositionResult {
            success: true,
            composition_id: Some(id),
            errors,
            warnings,
        }
    }

    /// Re-check a stored composition against the current registry state.
    pub async fn check(&self, store: &dyn CapabilityStore, id: &str) -> CompositionResult {
        let Some(composition) = self.get(id) else {
            return CompositionResult::failure(
                vec![format!("Composition '{}' not found", id)],
                Vec::new(),
            );
        };
        let errors = match availability_errors(store, &composition).await {
            Ok(errors) => errors,
            Err(e) => vec![e.to_string()],
        };
        CompositionResult {
            success: errors.is_empty(),
            composition_id: Some(composition.id),
            errors,
            warnings: Vec::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<CapabilityComposition> {
        self.compositions.read().get(id).cloned()
    }

    /// All compositions, sorted by id.
    pub fn list(&self) -> Vec<CapabilityComposition> {
        let mut all: Vec<_> = self.compositions.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.compositions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
