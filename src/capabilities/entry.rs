//! The registry entry, the aggregate record held for one capability id.
//!
//! An entry couples the declared [`Capability`] with its [`Provider`], the
//! lifecycle status (with an append-only transition log), resolved
//! dependencies, current consumers, usage metrics and descriptive metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use super::capability::{Capability, Provider};
use super::metrics::CapabilityMetrics;
use crate::error::{RegistryError, RegistryResult};

/// Transition reason recorded on registration.
pub const REASON_REGISTRATION: &str = "capability_registration";
/// Transition reason recorded on unregistration.
pub const REASON_UNREGISTRATION: &str = "capability_unregistration";

/// Lifecycle state of a registry entry.
///
/// ```text
/// unregistered -> available <-> {deprecated, experimental, maintenance}
///                     \______________________|______________> unavailable
/// ```
///
/// Nothing leaves `unavailable`; re-registration creates a fresh entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityState {
    Unregistered,
    Available,
    Deprecated,
    Experimental,
    Maintenance,
    Unavailable,
}

impl CapabilityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Available => "available",
            Self::Deprecated => "deprecated",
            Self::Experimental => "experimental",
            Self::Maintenance => "maintenance",
            Self::Unavailable => "unavailable",
        }
    }

    /// Whether the state machine allows moving from `self` to `to`.
    pub fn can_transition_to(&self, to: CapabilityState) -> bool {
        use CapabilityState::*;
        if *self == to {
            return false;
        }
        match (*self, to) {
            (Unregistered, Available) => true,
            (Unregistered, _) => false,
            (Unavailable, _) => false,
            (_, Unregistered) => false,
            (Available, _) => true,
            (Deprecated | Experimental | Maintenance, _) => true,
        }
    }
}

impl fmt::Display for CapabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: CapabilityState,
    pub to: CapabilityState,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Current state plus the append-only transition log.
///
/// The last transition's `to` always equals `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityStatus {
    pub status: CapabilityState,
    pub transitions: Vec<StatusTransition>,
}

impl CapabilityStatus {
    /// Initial status of a freshly registered entry.
    pub fn registered(at: DateTime<Utc>) -> Self {
        Self {
            status: CapabilityState::Available,
            transitions: vec![StatusTransition {
                from: CapabilityState::Unregistered,
                to: CapabilityState::Available,
                timestamp: at,
                reason: REASON_REGISTRATION.to_string(),
            }],
        }
    }

    pub fn last_transition(&self) -> Option<&StatusTransition> {
        self.transitions.last()
    }
}

/// Resolution state of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    Resolved,
    Unresolved,
    /// Present in the registry at a version that violates the constraint.
    Conflicted,
}

/// Another capability this entry needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDependency {
    pub capability_id: String,
    pub version_constraint: String,
    pub status: DependencyStatus,
    pub optional: bool,
}

/// How a consumer uses a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsagePattern {
    Direct,
    Indirect,
    Composition,
}

/// A module currently using a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityConsumer {
    pub module_id: String,
    pub usage: UsagePattern,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityExample {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub version: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub changes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportInfo {
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicensingInfo {
    /// SPDX identifier (e.g. `"MIT"`).
    pub license: String,
    #[serde(default)]
    pub commercial: bool,
}

/// Descriptive metadata for an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityEntryMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub examples: Vec<CapabilityExample>,
    #[serde(default)]
    pub changelog: Vec<ChangelogEntry>,
    #[serde(default)]
    pub support: Option<SupportInfo>,
    #[serde(default)]
    pub licensing: Option<LicensingInfo>,
    /// Open-ended extension data.
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// The full record the store holds for one capability id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityRegistryEntry {
    pub capability: Capability,
    pub provider: Provider,
    pub status: CapabilityStatus,
    pub dependencies: Vec<CapabilityDependency>,
    pub consumers: Vec<CapabilityConsumer>,
    pub metrics: CapabilityMetrics,
    pub metadata: CapabilityEntryMetadata,
}

impl CapabilityRegistryEntry {
    /// Build a freshly registered entry: `available`, zeroed metrics,
    /// metadata tags seeded from the capability.
    pub fn new(
        capability: Capability,
        provider: Provider,
        dependencies: Vec<CapabilityDependency>,
        at: DateTime<Utc>,
    ) -> Self {
        let metadata = CapabilityEntryMetadata {
            tags: capability.tags.clone(),
            documentation: if capability.description.is_empty() {
                None
            } else {
                Some(capability.description.clone())
            },
            ..Default::default()
        };
        Self {
            capability,
            provider,
            status: CapabilityStatus::registered(at),
            dependencies,
            consumers: Vec::new(),
            metrics: CapabilityMetrics::default(),
            metadata,
        }
    }

    pub fn id(&self) -> &str {
        &self.capability.id
    }

    pub fn state(&self) -> CapabilityState {
        self.status.status
    }

    pub fn is_available(&self) -> bool {
        self.status.status == CapabilityState::Available
    }

    /// Move to `to`, appending a transition record.
    pub fn transition(
        &mut self,
        to: CapabilityState,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> RegistryResult<()> {
        let from = self.status.status;
        if !from.can_transition_to(to) {
            return Err(RegistryError::InvalidTransition {
                id: self.capability.id.clone(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.status.transitions.push(StatusTransition {
            from,
            to,
            timestamp: at,
            reason: reason.into(),
        });
        self.status.status = to;
        Ok(())
    }

    /// Add or update a consumer. Returns `true` when the module is new.
    pub fn upsert_consumer(&mut self, module_id: &str, usage: UsagePattern, at: DateTime<Utc>) -> bool {
        if let Some(existing) = self.consumers.iter_mut().find(|c| c.module_id == module_id) {
            existing.usage = usage;
            return false;
        }
        self.consumers.push(CapabilityConsumer {
            module_id: module_id.to_string(),
            usage,
            since: at,
        });
        true
    }

    pub fn remove_consumer(&mut self, module_id: &str) -> bool {
        let before = self.consumers.len();
        self.consumers.retain(|c| c.module_id != module_id);
        self.consumers.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> CapabilityRegistryEntry {
        CapabilityRegistryEntry::new(
            Capability::new("pdf.export", "PDF Export", "1.0.0").with_tags(["pdf"]),
            Provider::new("docgen", "1.0.0"),
            vec![],
            Utc::now(),
        )
    }

    #[test]
    fn test_new_entry_is_available() {
        let e = entry();
        assert_eq!(e.state(), CapabilityState::Available);
        assert_eq!(e.status.transitions.len(), 1);
        let t = e.status.last_transition().unwrap();
        assert_eq!(t.from, CapabilityState::Unregistered);
        assert_eq!(t.to, CapabilityState::Available);
        assert_eq!(t.reason, REASON_REGISTRATION);
        assert_eq!(e.metadata.tags, vec!["pdf"]);
        assert_eq!(e.metrics.usage_count, 0);
    }

    #[test]
    fn test_transitions_append_and_track_state() {
        let mut e = entry();
        e.transition(CapabilityState::Maintenance, "upgrade", Utc::now()).unwrap();
        e.transition(CapabilityState::Available, "upgrade done", Utc::now()).unwrap();
        e.transition(CapabilityState::Deprecated, "superseded", Utc::now()).unwrap();
        e.transition(CapabilityState::Unavailable, "retired", Utc::now()).unwrap();

        assert_eq!(e.status.transitions.len(), 5);
        assert_eq!(e.status.last_transition().unwrap().to, e.state());
    }

    #[test]
    fn test_invalid_transitions_leave_log_untouched() {
        let mut e = entry();
        assert!(e.transition(CapabilityState::Available, "noop", Utc::now()).is_err());
        assert!(e.transition(CapabilityState::Unregistered, "back", Utc::now()).is_err());
        e.transition(CapabilityState::Unavailable, "gone", Utc::now()).unwrap();
        let err = e
            .transition(CapabilityState::Available, "revive", Utc::now())
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
        assert_eq!(e.status.transitions.len(), 2);
        assert_eq!(e.state(), CapabilityState::Unavailable);
    }

    #[test]
    fn test_consumers() {
        let mut e = entry();
        assert!(e.upsert_consumer("invoices", UsagePattern::Direct, Utc::now()));
        assert!(!e.upsert_consumer("invoices", UsagePattern::Composition, Utc::now()));
        assert_eq!(e.consumers.len(), 1);
        assert_eq!(e.consumers[0].usage, UsagePattern::Composition);
        assert!(e.remove_consumer("invoices"));
        assert!(!e.remove_consumer("invoices"));
    }
}
