//! # Capability Registry
//!
//! Central registry for a hot-pluggable module system. Modules announce the
//! capabilities they provide; the registry validates them, rejects
//! conflicting ids, answers discovery queries, assembles compositions and
//! tracks lifecycle state and usage metrics for every entry.
//!
//! The registry is purely in-process. The hosting module loader talks to
//! it through [`CapabilityRegistry`] and listens for lifecycle events via
//! [`hooks::LifecycleListener`].

pub mod capabilities;
pub mod config;
pub mod error;
pub mod hooks;
pub mod telemetry;

pub use capabilities::{
    Capability, CapabilityComposition, CapabilityDiscoveryQuery, CapabilityRegistry,
    CapabilityRegistryEntry, CapabilityState, ModuleManifest, Provider,
};
pub use config::RegistryConfig;
pub use error::{RegistryError, RegistryResult, StoreError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
