//! Capability Registry — the service the hosting application talks to.
//!
//! The registry ties together:
//! - A [`CapabilityStore`] holding the authoritative entries
//! - Validation and conflict detection run before every registration
//! - A [`DiscoveryEngine`] answering structured queries (with a TTL cache)
//! - A [`CompositionManager`] for capability pipelines
//! - [`LifecycleHooks`] notified after every successful mutation
//! - An optional [`AnalyticsCollector`] fed on every lookup
//!
//! Every public operation reports failure through its result object
//! (`success` plus `errors` / `warnings`) instead of returning `Err`.
//!
//! Store mutations run one at a time behind an async write gate, so the
//! conflict check and the insert it guards are atomic even on a
//! multi-threaded runtime. Listeners and analytics are called after the
//! gate is released.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::capability::{Capability, Provider};
use super::composition::{CapabilityComposition, CompositionManager, CompositionResult};
use super::discovery::{CapabilityDiscoveryQuery, DiscoveryEngine, DiscoveryResult};
use super::entry::{
    CapabilityDependency, CapabilityEntryMetadata, CapabilityRegistryEntry, CapabilityState,
    DependencyStatus, UsagePattern, REASON_UNREGISTRATION,
};
use super::manifest::ModuleManifest;
use super::metrics::ResourceKind;
use super::store::{CapabilityStore, InMemoryCapabilityStore};
use super::validation::{detect_conflicts, validate};
use super::version::VersionConstraint;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::hooks::{CapabilityLifecycleEvent, LifecycleEventKind, LifecycleHooks, LifecycleListener};
use crate::telemetry::{dispatch_usage, AnalyticsCollector, UsageEvent};

// ============================================================================
// Result types
// ============================================================================

/// Outcome of `register_capability`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResult {
    pub success: bool,
    pub capability_id: Option<String>,
    pub entry: Option<CapabilityRegistryEntry>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RegistrationResult {
    fn failure(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
            warnings,
            ..Default::default()
        }
    }
}

/// Outcome of unregistration, status changes and metric updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    pub capability_id: Option<String>,
    pub errors: Vec<String>,
}

impl OperationResult {
    fn ok(id: &str) -> Self {
        Self {
            success: true,
            capability_id: Some(id.to_string()),
            errors: Vec::new(),
        }
    }

    fn failed(id: &str, error: RegistryError) -> Self {
        Self {
            success: false,
            capability_id: Some(id.to_string()),
            errors: vec![error.to_string()],
        }
    }
}

/// Snapshot counters over the whole registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityStatistics {
    pub total_capabilities: usize,
    pub status_counts: BTreeMap<String, usize>,
    /// Entries without a category are counted under `"uncategorized"`.
    pub category_counts: BTreeMap<String, usize>,
    pub provider_counts: BTreeMap<String, usize>,
    pub total_compositions: usize,
    /// Time of the last successful registry mutation.
    pub last_updated: DateTime<Utc>,
}

// ============================================================================
// CapabilityRegistry
// ============================================================================

pub struct CapabilityRegistry {
    config: RegistryConfig,
    store: Arc<dyn CapabilityStore>,
    discovery: DiscoveryEngine,
    compositions: CompositionManager,
    hooks: LifecycleHooks,
    analytics: Option<Arc<dyn AnalyticsCollector>>,
    write_gate: Mutex<()>,
    last_updated: RwLock<DateTime<Utc>>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("compositions", &self.compositions.len())
            .field("hooks", &self.hooks)
            .field("analytics", &self.analytics.is_some())
            .finish()
    }
}

impl CapabilityRegistry {
    /// Create an empty in-memory registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty in-memory registry.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            discovery: DiscoveryEngine::new(
                config.discovery_cache_ttl(),
                config.discovery_cache_enabled,
            )
            .with_capacity(config.discovery_cache_capacity),
            config,
            store: Arc::new(InMemoryCapabilityStore::new()),
            compositions: CompositionManager::new(),
            hooks: LifecycleHooks::new(),
            analytics: None,
            write_gate: Mutex::new(()),
            last_updated: RwLock::new(Utc::now()),
        }
    }

    /// Replace the backing store.
    pub fn with_store(mut self, store: Arc<dyn CapabilityStore>) -> Self {
        self.store = store;
        self
    }

    /// Send usage events to `collector` (unless analytics is disabled in config).
    pub fn with_analytics(mut self, collector: Arc<dyn AnalyticsCollector>) -> Self {
        self.analytics = Some(collector);
        self
    }

    pub fn with_listener(mut self, listener: impl LifecycleListener) -> Self {
        self.hooks.register(listener);
        self
    }

    pub fn add_listener(&mut self, listener: impl LifecycleListener) {
        self.hooks.register(listener);
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn touch(&self) {
        *self.last_updated.write() = Utc::now();
    }

    async fn notify(&self, kind: LifecycleEventKind, entry: &CapabilityRegistryEntry) {
        if self.hooks.is_empty() {
            return;
        }
        let event = CapabilityLifecycleEvent::new(kind, entry);
        self.hooks.dispatch(&event).await;
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Validate, conflict-check and store a capability.
    pub async fn register_capability(
        &self,
        capability: Capability,
        provider: Provider,
    ) -> RegistrationResult {
        self.register_capability_with_metadata(capability, provider, None)
            .await
    }

    /// Like [`register_capability`](Self::register_capability), seeding the
    /// entry metadata. Capability tags are merged into `metadata.tags`.
    pub async fn register_capability_with_metadata(
        &self,
        capability: Capability,
        mut provider: Provider,
        metadata: Option<CapabilityEntryMetadata>,
    ) -> RegistrationResult {
        let report = validate(&capability, &provider);
        let mut warnings = report.warnings;
        if !report.valid {
            log::info!(
                "Rejected capability '{}': {}",
                capability.id,
                report.errors.join("; ")
            );
            return RegistrationResult::failure(report.errors, warnings);
        }

        let gate = self.write_gate.lock().await;

        let conflicts = match detect_conflicts(self.store.as_ref(), &capability).await {
            Ok(conflicts) => conflicts,
            Err(e) => return RegistrationResult::failure(vec![e.to_string()], warnings),
        };
        if !conflicts.is_empty() {
            log::info!(
                "Capability '{}' conflicts with an existing registration",
                capability.id
            );
            let errors = conflicts.into_iter().map(|c| c.message).collect();
            return RegistrationResult::failure(errors, warnings);
        }

        let dependencies = match self.resolve_dependencies(&capability).await {
            Ok(deps) => deps,
            Err(e) => return RegistrationResult::failure(vec![e.to_string()], warnings),
        };
        for dep in dependencies.iter().filter(|d| !d.optional) {
            match dep.status {
                DependencyStatus::Resolved => {}
                DependencyStatus::Unresolved => warnings.push(format!(
                    "Dependency '{}' is not registered",
                    dep.capability_id
                )),
                DependencyStatus::Conflicted => warnings.push(format!(
                    "Dependency '{}' does not satisfy '{}'",
                    dep.capability_id, dep.version_constraint
                )),
            }
        }

        let now = Utc::now();
        provider.updated_at = now;
        let mut entry = CapabilityRegistryEntry::new(capability, provider, dependencies, now);
        if let Some(mut metadata) = metadata {
            for tag in std::mem::take(&mut entry.metadata.tags) {
                if !metadata.tags.contains(&tag) {
                    metadata.tags.push(tag);
                }
            }
            if metadata.documentation.is_none() {
                metadata.documentation = entry.metadata.documentation.take();
            }
            entry.metadata = metadata;
        }

        if let Err(e) = self.store.put(entry.clone()).await {
            return RegistrationResult::failure(vec![e.to_string()], warnings);
        }
        let id = entry.capability.id.clone();
        if let Err(e) = self.refresh_dependents(&id).await {
            log::warn!("Failed to refresh dependents of '{}': {}", id, e);
        }
        self.touch();
        drop(gate);

        log::info!(
            "Registered capability '{}' v{} from module '{}'",
            id,
            entry.capability.version,
            entry.provider.module_id
        );
        self.notify(LifecycleEventKind::Activated, &entry).await;

        RegistrationResult {
            success: true,
            capability_id: Some(id),
            entry: Some(entry),
            errors: Vec::new(),
            warnings,
        }
    }

    /// Register every capability a module manifest declares, in order.
    pub async fn register_module(&self, manifest: &ModuleManifest) -> Vec<RegistrationResult> {
        let provider = manifest.provider();
        let mut results = Vec::with_capacity(manifest.capabilities.len());
        for declared in &manifest.capabilities {
            results.push(
                self.register_capability_with_metadata(
                    declared.capability.clone(),
                    provider.clone(),
                    declared.metadata.clone(),
                )
                .await,
            );
        }
        results
    }

    /// Transition a capability to `unavailable`, remove it and notify listeners.
    ///
    /// An entry already moved to `unavailable` through
    /// [`set_status`](Self::set_status) is removed without a second
    /// transition, so the deactivation event carries that earlier reason
    /// instead of `capability_unregistration`.
    pub async fn unregister_capability(&self, capability_id: &str) -> OperationResult {
        let gate = self.write_gate.lock().await;

        let mut entry = match self.store.get(capability_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                return OperationResult::failed(
                    capability_id,
                    RegistryError::NotFound(capability_id.to_string()),
                )
            }
            Err(e) => return OperationResult::failed(capability_id, e.into()),
        };

        if entry.state() != CapabilityState::Unavailable {
            if let Err(e) =
                entry.transition(CapabilityState::Unavailable, REASON_UNREGISTRATION, Utc::now())
            {
                return OperationResult::failed(capability_id, e);
            }
        }
        match self.store.delete(capability_id).await {
            Ok(true) => {}
            Ok(false) => {
                return OperationResult::failed(
                    capability_id,
                    RegistryError::NotFound(capability_id.to_string()),
                )
            }
            Err(e) => return OperationResult::failed(capability_id, e.into()),
        }
        if let Err(e) = self.refresh_dependents(capability_id).await {
            log::warn!("Failed to refresh dependents of '{}': {}", capability_id, e);
        }
        self.touch();
        drop(gate);

        log::info!(
            "Unregistered capability '{}' from module '{}'",
            capability_id,
            entry.provider.module_id
        );
        self.notify(LifecycleEventKind::Deactivated, &entry).await;

        OperationResult::ok(capability_id)
    }

    /// Unregister every capability supplied by `module_id`.
    pub async fn unregister_module(&self, module_id: &str) -> Vec<OperationResult> {
        let mut results = Vec::new();
        for entry in self.get_capabilities_by_provider(module_id).await {
            results.push(self.unregister_capability(entry.id()).await);
        }
        results
    }

    async fn resolve_dependencies(
        &self,
        capability: &Capability,
    ) -> RegistryResult<Vec<CapabilityDependency>> {
        let mut deps = Vec::new();
        for req in capability.capability_requirements() {
            let constraint = req.version.clone().unwrap_or_else(|| "*".to_string());
            let status = self.dependency_status(&req.target, &constraint).await?;
            deps.push(CapabilityDependency {
                capability_id: req.target.clone(),
                version_constraint: constraint,
                status,
                optional: req.optional,
            });
        }
        Ok(deps)
    }

    async fn dependency_status(
        &self,
        target: &str,
        constraint: &str,
    ) -> RegistryResult<DependencyStatus> {
        let parsed = VersionConstraint::parse(constraint)?;
        Ok(match self.store.get(target).await? {
            None => DependencyStatus::Unresolved,
            Some(dep) if parsed.matches(&dep.capability.version) => DependencyStatus::Resolved,
            Some(_) => DependencyStatus::Conflicted,
        })
    }

    /// Re-resolve dependencies on `changed_id` in every other entry.
    /// Caller must hold the write gate.
    async fn refresh_dependents(&self, changed_id: &str) -> RegistryResult<()> {
        for mut entry in self.store.all().await? {
            if !entry
                .dependencies
                .iter()
                .any(|d| d.capability_id == changed_id)
            {
                continue;
            }
            let mut changed = false;
            for i in 0..entry.dependencies.len() {
                if entry.dependencies[i].capability_id != changed_id {
                    continue;
                }
                let status = self
                    .dependency_status(changed_id, &entry.dependencies[i].version_constraint)
                    .await?;
                if entry.dependencies[i].status != status {
                    entry.dependencies[i].status = status;
                    changed = true;
                }
            }
            if changed {
                self.store.put(entry).await?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Fetch an entry, counting the lookup in its usage metrics and
    /// reporting it to the analytics collector.
    pub async fn get_capability(&self, capability_id: &str) -> Option<CapabilityRegistryEntry> {
        let gate = self.write_gate.lock().await;
        let mut entry = match self.store.get(capability_id).await {
            Ok(entry) => entry?,
            Err(e) => {
                log::warn!("Lookup of '{}' failed: {}", capability_id, e);
                return None;
            }
        };
        entry.metrics.record_usage(Utc::now());
        if let Err(e) = self.store.put(entry.clone()).await {
            log::warn!("Failed to persist usage of '{}': {}", capability_id, e);
        }
        drop(gate);

        if self.config.analytics_enabled {
            if let Some(collector) = &self.analytics {
                dispatch_usage(
                    collector.clone(),
                    UsageEvent {
                        capability_id: entry.capability.id.clone(),
                        provider_module_id: entry.provider.module_id.clone(),
                        usage_count: entry.metrics.usage_count,
                        timestamp: entry.metrics.last_used.unwrap_or_else(Utc::now),
                    },
                );
            }
        }
        Some(entry)
    }

    /// Fetch an entry without touching its metrics.
    pub async fn peek_capability(&self, capability_id: &str) -> Option<CapabilityRegistryEntry> {
        self.store.get(capability_id).await.unwrap_or_else(|e| {
            log::warn!("Lookup of '{}' failed: {}", capability_id, e);
            None
        })
    }

    pub async fn get_all_capabilities(&self) -> Vec<CapabilityRegistryEntry> {
        self.store.all().await.unwrap_or_else(|e| {
            log::warn!("Listing capabilities failed: {}", e);
            Vec::new()
        })
    }

    pub async fn get_capabilities_by_category(
        &self,
        category_id: &str,
    ) -> Vec<CapabilityRegistryEntry> {
        self.store.by_category(category_id).await.unwrap_or_else(|e| {
            log::warn!("Listing category '{}' failed: {}", category_id, e);
            Vec::new()
        })
    }

    pub async fn get_capabilities_by_provider(
        &self,
        module_id: &str,
    ) -> Vec<CapabilityRegistryEntry> {
        self.store.by_provider(module_id).await.unwrap_or_else(|e| {
            log::warn!("Listing provider '{}' failed: {}", module_id, e);
            Vec::new()
        })
    }

    // -----------------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------------

    /// Run a discovery query. Results may come from a cache entry up to the
    /// configured TTL old, so they can lag behind recent registrations.
    pub async fn discover_capabilities(&self, query: &CapabilityDiscoveryQuery) -> DiscoveryResult {
        self.discovery.discover(self.store.as_ref(), query).await
    }

    /// Run a discovery query straight against the store.
    pub async fn discover_capabilities_uncached(
        &self,
        query: &CapabilityDiscoveryQuery,
    ) -> DiscoveryResult {
        self.discovery
            .discover_uncached(self.store.as_ref(), query)
            .await
    }

    pub fn clear_discovery_cache(&self) {
        self.discovery.clear_cache();
    }

    // -----------------------------------------------------------------------
    // Lifecycle & metrics
    // -----------------------------------------------------------------------

    async fn mutate_entry<F>(&self, capability_id: &str, mutate: F) -> RegistryResult<CapabilityRegistryEntry>
    where
        F: FnOnce(&mut CapabilityRegistryEntry) -> RegistryResult<()> + Send,
    {
        let _gate = self.write_gate.lock().await;
        let mut entry = self
            .store
            .get(capability_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(capability_id.to_string()))?;
        mutate(&mut entry)?;
        self.store.put(entry.clone()).await?;
        Ok(entry)
    }

    /// Move a registered capability to another lifecycle state.
    ///
    /// Moving to `unavailable` keeps the entry in the store (compositions
    /// referencing it stop validating); use
    /// [`unregister_capability`](Self::unregister_capability) to remove it.
    pub async fn set_status(
        &self,
        capability_id: &str,
        status: CapabilityState,
        reason: &str,
    ) -> OperationResult {
        let result = self
            .mutate_entry(capability_id, |entry| {
                entry.transition(status, reason, Utc::now())
            })
            .await;
        match result {
            Ok(entry) => {
                self.touch();
                log::info!("Capability '{}' is now {}", capability_id, status);
                self.notify(LifecycleEventKind::StatusChanged, &entry).await;
                OperationResult::ok(capability_id)
            }
            Err(e) => OperationResult::failed(capability_id, e),
        }
    }

    /// Report the outcome of one call to a capability.
    pub async fn record_outcome(
        &self,
        capability_id: &str,
        success: bool,
        response_time_ms: f64,
    ) -> OperationResult {
        let result = self
            .mutate_entry(capability_id, |entry| {
                entry.metrics.record_outcome(success, response_time_ms);
                Ok(())
            })
            .await;
        match result {
            Ok(_) => OperationResult::ok(capability_id),
            Err(e) => OperationResult::failed(capability_id, e),
        }
    }

    /// Report a resource reading for a capability.
    pub async fn record_resource_usage(
        &self,
        capability_id: &str,
        kind: ResourceKind,
        value: f64,
    ) -> OperationResult {
        let result = self
            .mutate_entry(capability_id, |entry| {
                entry.metrics.record_resource(kind, value);
                Ok(())
            })
            .await;
        match result {
            Ok(_) => OperationResult::ok(capability_id),
            Err(e) => OperationResult::failed(capability_id, e),
        }
    }

    /// Record that `module_id` uses a capability.
    pub async fn add_consumer(
        &self,
        capability_id: &str,
        module_id: &str,
        usage: UsagePattern,
    ) -> OperationResult {
        if module_id.trim().is_empty() {
            return OperationResult::failed(
                capability_id,
                RegistryError::Validation("Consumer module ID is required".into()),
            );
        }
        let result = self
            .mutate_entry(capability_id, |entry| {
                entry.upsert_consumer(module_id, usage, Utc::now());
                Ok(())
            })
            .await;
        match result {
            Ok(_) => OperationResult::ok(capability_id),
            Err(e) => OperationResult::failed(capability_id, e),
        }
    }

    pub async fn remove_consumer(&self, capability_id: &str, module_id: &str) -> OperationResult {
        let result = self
            .mutate_entry(capability_id, |entry| {
                if entry.remove_consumer(module_id) {
                    Ok(())
                } else {
                    Err(RegistryError::Validation(format!(
                        "Module '{}' is not a consumer of '{}'",
                        module_id, capability_id
                    )))
                }
            })
            .await;
        match result {
            Ok(_) => OperationResult::ok(capability_id),
            Err(e) => OperationResult::failed(capability_id, e),
        }
    }

    // -----------------------------------------------------------------------
    // Compositions
    // -----------------------------------------------------------------------

    /// Validate and store a composition. Runs under the write gate so no
    /// referenced capability can change state mid-check.
    pub async fn create_composition(&self, composition: CapabilityComposition) -> CompositionResult {
        let gate = self.write_gate.lock().await;
        let result = self
            .compositions
            .create(self.store.as_ref(), composition)
            .await;
        if result.success {
            self.touch();
        }
        drop(gate);
        result
    }

    /// Re-validate a stored composition against current capability states.
    pub async fn check_composition(&self, composition_id: &str) -> CompositionResult {
        self.compositions
            .check(self.store.as_ref(), composition_id)
            .await
    }

    pub fn get_composition(&self, composition_id: &str) -> Option<CapabilityComposition> {
        self.compositions.get(composition_id)
    }

    pub fn list_compositions(&self) -> Vec<CapabilityComposition> {
        self.compositions.list()
    }

    pub fn composition_count(&self) -> usize {
        self.compositions.len()
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    pub async fn get_capability_statistics(&self) -> CapabilityStatistics {
        let entries = self.get_all_capabilities().await;
        let mut status_counts = BTreeMap::new();
        let mut category_counts = BTreeMap::new();
        let mut provider_counts = BTreeMap::new();

        for entry in &entries {
            *status_counts
                .entry(entry.state().as_str().to_string())
                .or_insert(0) += 1;
            let category = entry
                .capability
                .category_id()
                .unwrap_or("uncategorized")
                .to_string();
            *category_counts.entry(category).or_insert(0) += 1;
            *provider_counts
                .entry(entry.provider.module_id.clone())
                .or_insert(0) += 1;
        }

        CapabilityStatistics {
            total_capabilities: entries.len(),
            status_counts,
            category_counts,
            provider_counts,
            total_compositions: self.compositions.len(),
            last_updated: *self.last_updated.read(),
        }
    }
}
