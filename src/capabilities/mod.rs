//! # Capability Registry
//!
//! Tracks what each loaded module can do. Modules register capabilities
//! (named, versioned, categorized units of functionality), consumers find
//! them through structured discovery queries, and several capabilities can
//! be bundled into a validated composition.
//!
//! ## Architecture
//!
//! ```text
//! ModuleManifest (YAML) ──► CapabilityRegistry ──► CapabilityStore
//!                              │   │   │
//!                              │   │   └─► CompositionManager
//!                              │   └─────► DiscoveryEngine (TTL cache)
//!                              └─────────► LifecycleHooks / AnalyticsCollector
//! ```
//!
//! ## Registration Flow
//!
//! 1. `validate` checks required fields and version syntax
//! 2. `detect_conflicts` rejects an id that is already registered
//! 3. Capability requirements are resolved against the store
//! 4. The entry is stored as `available` with one transition recorded
//! 5. Listeners receive an activation event

pub mod capability;
pub mod composition;
pub mod discovery;
pub mod entry;
pub mod manifest;
pub mod metrics;
pub mod registry;
pub mod store;
pub mod validation;
pub mod version;

pub use capability::{
    Capability, CapabilityCategory, CapabilityInterfaceDef, CapabilityRequirement, Provider,
    ProviderStatus, RequirementKind,
};
pub use composition::{
    CapabilityComposition, CapabilityCompositionEntry, CompositionManager, CompositionResult,
    CompositionRole, CompositionStatus,
};
pub use discovery::{
    CapabilityDiscoveryQuery, DiscoveryEngine, DiscoveryResult, SortDirection, SortField,
};
pub use entry::{
    CapabilityConsumer, CapabilityDependency, CapabilityEntryMetadata, CapabilityRegistryEntry,
    CapabilityState, DependencyStatus, StatusTransition, UsagePattern,
};
pub use manifest::{load_manifests_from_dir, ModuleManifest};
pub use metrics::{CapabilityMetrics, ResourceKind, Trend};
pub use registry::{
    CapabilityRegistry, CapabilityStatistics, OperationResult, RegistrationResult,
};
pub use store::{CapabilityStore, InMemoryCapabilityStore};
pub use validation::{CapabilityConflict, ConflictKind, ValidationReport};
pub use version::{Version, VersionConstraint};
