//! Discovery engine — structured capability queries with a TTL cache.
//!
//! A [`CapabilityDiscoveryQuery`] has three parts:
//! - `parameters`: what an entry must be (id, name substring, category, tags, status, provider, ...)
//! - `filters`: refinements applied to the matched set (version constraints,
//!   provider, performance, resource and licensing thresholds)
//! - `options`: sorting, pagination and which parts of each entry to return
//!
//! Results are cached under the SHA-256 of the query's JSON serialization.
//! Expiry is time-based only: registering or unregistering a capability does
//! not invalidate cached results, so a query repeated within the TTL can
//! return an entry that has since been removed (or miss one that was added).
//! Callers that need read-your-write consistency use
//! [`DiscoveryEngine::discover_uncached`] or clear the cache.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::capability::ProviderStatus;
use super::entry::{CapabilityRegistryEntry, CapabilityState};
use super::metrics::CapabilityMetrics;
use super::store::CapabilityStore;
use super::version::{compare_versions, VersionConstraint};
use crate::error::{RegistryError, RegistryResult};

/// Error code attached to failed discoveries.
pub const DISCOVERY_ERROR: &str = "DISCOVERY_ERROR";

/// Default lifetime of a cached discovery result (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(300_000);

/// Default maximum number of cached discovery results.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

// ============================================================================
// Query
// ============================================================================

/// A structured discovery request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CapabilityDiscoveryQuery {
    pub parameters: DiscoveryParameters,
    pub filters: DiscoveryFilters,
    pub options: DiscoveryOptions,
}

impl CapabilityDiscoveryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        let mut q = Self::default();
        q.parameters.capability_id = Some(id.into());
        q
    }

    pub fn by_category(category: impl Into<String>) -> Self {
        let mut q = Self::default();
        q.parameters.category = Some(category.into());
        q
    }

    pub fn with_sort(mut self, field: SortField, direction: SortDirection) -> Self {
        self.options.sort_by = Some(field);
        self.options.sort_direction = direction;
        self
    }

    pub fn with_page(mut self, limit: usize, offset: usize) -> Self {
        self.options.limit = Some(limit);
        self.options.offset = Some(offset);
        self
    }
}

/// Fields an entry must satisfy. Unset fields match everything.
///
/// `name` and `description` are case-insensitive substring matches, `tags`
/// requires every listed tag, the status sets are membership tests and the
/// rest are exact matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscoveryParameters {
    pub capability_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub version: Option<String>,
    pub status: Vec<CapabilityState>,
    pub provider_module_id: Option<String>,
    pub provider_status: Vec<ProviderStatus>,
}

/// Refinements applied after parameter matching. All are AND-ed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscoveryFilters {
    /// Every constraint must accept the capability version.
    pub version_constraints: Vec<String>,
    /// Entries in any of these states are dropped.
    pub exclude_statuses: Vec<CapabilityState>,
    pub provider: ProviderFilters,
    pub performance: PerformanceFilters,
    pub resources: ResourceFilters,
    pub licensing: LicensingFilters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderFilters {
    /// Allowed provider modules; empty allows all.
    pub module_ids: Vec<String>,
    pub min_priority: Option<i32>,
    pub exclude_statuses: Vec<ProviderStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PerformanceFilters {
    pub min_response_time_ms: Option<f64>,
    pub max_response_time_ms: Option<f64>,
    pub min_success_rate: Option<f64>,
    pub max_error_rate: Option<f64>,
}

/// Upper bounds on the current resource readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceFilters {
    pub max_memory: Option<f64>,
    pub max_cpu: Option<f64>,
    pub max_storage: Option<f64>,
    pub max_network: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LicensingFilters {
    /// Accepted license identifiers; empty accepts any (including none).
    pub allowed_licenses: Vec<String>,
    pub require_commercial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Name,
    /// Semantic version order; unparsable versions sort first.
    Version,
    UsageCount,
    LastUsed,
    ResponseTime,
    SuccessRate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscoveryOptions {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub sort_by: Option<SortField>,
    pub sort_direction: SortDirection,
    pub include_metadata: bool,
    pub include_metrics: bool,
    pub include_examples: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            limit: None,
            offset: None,
            sort_by: None,
            sort_direction: SortDirection::Asc,
            include_metadata: true,
            include_metrics: true,
            include_examples: true,
        }
    }
}

// ============================================================================
// Result
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryIssue {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryMetadata {
    pub query_id: String,
    /// When the store scan behind this result ran.
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
    pub total_found: usize,
    pub returned: usize,
    pub query: CapabilityDiscoveryQuery,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryPerformance {
    pub query_time_ms: f64,
    pub entries_scanned: usize,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub capabilities: Vec<CapabilityRegistryEntry>,
    pub metadata: DiscoveryMetadata,
    pub errors: Vec<DiscoveryIssue>,
    pub warnings: Vec<DiscoveryIssue>,
    pub performance: DiscoveryPerformance,
}

impl DiscoveryResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn failed(query: &CapabilityDiscoveryQuery, started: Instant, error: RegistryError) -> Self {
        let elapsed = elapsed_ms(started);
        Self {
            capabilities: Vec::new(),
            metadata: DiscoveryMetadata {
                query_id: uuid::Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
                duration_ms: elapsed,
                total_found: 0,
                returned: 0,
                query: query.clone(),
            },
            errors: vec![DiscoveryIssue {
                code: DISCOVERY_ERROR.to_string(),
                message: error.to_string(),
            }],
            warnings: Vec::new(),
            performance: DiscoveryPerformance {
                query_time_ms: elapsed,
                entries_scanned: 0,
                cache_hit: false,
            },
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone)]
struct CachedDiscovery {
    result: DiscoveryResult,
    cached_at: Instant,
}

/// Executes discovery queries against a store and caches the results.
///
/// Expired results are pruned whenever a new result is cached, and the cache
/// never holds more than `capacity` results: the oldest one is evicted first.
#[derive(Debug)]
pub struct DiscoveryEngine {
    cache: DashMap<String, CachedDiscovery>,
    ttl: Duration,
    capacity: usize,
    cache_enabled: bool,
}

impl Default for DiscoveryEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL, true)
    }
}

impl DiscoveryEngine {
    pub fn new(ttl: Duration, cache_enabled: bool) -> Self {
        Self {
            cache: DashMap::new(),
            ttl,
            capacity: DEFAULT_CACHE_CAPACITY,
            cache_enabled,
        }
    }

    /// Limit the number of cached results (at least one).
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Deterministic cache key for a query.
    pub fn cache_key(query: &CapabilityDiscoveryQuery) -> Option<String> {
        let bytes = serde_json::to_vec(query).ok()?;
        Some(hex::encode(Sha256::digest(&bytes)))
    }

    /// Run a query, answering from the cache when a fresh result exists.
    ///
    /// Never fails: errors are reported in [`DiscoveryResult::errors`] with
    /// code [`DISCOVERY_ERROR`].
    pub async fn discover(
        &self,
        store: &dyn CapabilityStore,
        query: &CapabilityDiscoveryQuery,
    ) -> DiscoveryResult {
        let started = Instant::now();
        let key = if self.cache_enabled {
            Self::cache_key(query)
        } else {
            None
        };

        if let Some(key) = &key {
            if let Some(hit) = self.lookup(key) {
                let mut result = hit;
                let elapsed = elapsed_ms(started);
                result.metadata.duration_ms = elapsed;
                result.performance.query_time_ms = elapsed;
                result.performance.cache_hit = true;
                log::debug!("Discovery cache hit for query {}", result.metadata.query_id);
                return result;
            }
        }

        let result = self.run(store, query, started).await;
        if let Some(key) = key {
            if result.is_ok() {
                self.remember(key, result.clone());
            }
        }
        result
    }

    /// Run a query against the store, bypassing and not populating the cache.
    pub async fn discover_uncached(
        &self,
        store: &dyn CapabilityStore,
        query: &CapabilityDiscoveryQuery,
    ) -> DiscoveryResult {
        self.run(store, query, Instant::now()).await
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Drop expired cache entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.cache.len();
        let ttl = self.ttl;
        self.cache.retain(|_, cached| cached.cached_at.elapsed() < ttl);
        before.saturating_sub(self.cache.len())
    }

    fn remember(&self, key: String, result: DiscoveryResult) {
        self.purge_expired();
        while self.cache.len() >= self.capacity && !self.cache.contains_key(&key) {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|cached| cached.value().cached_at)
                .map(|cached| cached.key().clone());
            match oldest {
                Some(oldest) => {
                    self.cache.remove(&oldest);
                }
                None => break,
            }
        }
        self.cache.insert(
            key,
            CachedDiscovery {
                result,
                cached_at: Instant::now(),
            },
        );
    }

    fn lookup(&self, key: &str) -> Option<DiscoveryResult> {
        let fresh = {
            let cached = self.cache.get(key)?;
            if cached.cached_at.elapsed() < self.ttl {
                Some(cached.result.clone())
            } else {
                None
            }
        };
        if fresh.is_none() {
            self.cache.remove(key);
        }
        fresh
    }

    async fn run(
        &self,
        store: &dyn CapabilityStore,
        query: &CapabilityDiscoveryQuery,
        started: Instant,
    ) -> DiscoveryResult {
        match execute(store, query).await {
            Ok((capabilities, total_found, entries_scanned)) => {
                let elapsed = elapsed_ms(started);
                DiscoveryResult {
                    metadata: DiscoveryMetadata {
                        query_id: uuid::Uuid::new_v4().to_string(),
                        timestamp: Utc::now(),
                        duration_ms: elapsed,
                        total_found,
                        returned: capabilities.len(),
                        query: query.clone(),
                    },
                    capabilities,
                    errors: Vec::new(),
                    warnings: Vec::new(),
                    performance: DiscoveryPerformance {
                        query_time_ms: elapsed,
                        entries_scanned,
                        cache_hit: false,
                    },
                }
            }
            Err(e) => {
                log::warn!("Capability discovery failed: {}", e);
                DiscoveryResult::failed(query, started, e)
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Match, filter, sort and paginate. Returns (page, total matched, scanned).
async fn execute(
    store: &dyn CapabilityStore,
    query: &CapabilityDiscoveryQuery,
) -> RegistryResult<(Vec<CapabilityRegistryEntry>, usize, usize)> {
    let constraints = query
        .filters
        .version_constraints
        .iter()
        .map(|c| VersionConstraint::parse(c))
        .collect::<Result<Vec<_>, _>>()?;

    let entries = store.all().await?;
    let scanned = entries.len();

    let mut matched: Vec<CapabilityRegistryEntry> = entries
        .into_iter()
        .filter(|e| matches_parameters(e, &query.parameters))
        .filter(|e| passes_filters(e, &query.filters, &constraints))
        .collect();
    let total = matched.len();

    sort_entries(&mut matched, &query.options);

    let offset = query.options.offset.unwrap_or(0);
    let limit = query.options.limit.unwrap_or(usize::MAX);
    let page = matched
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|e| shape_entry(e, &query.options))
        .collect();

    Ok((page, total, scanned))
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches_parameters(entry: &CapabilityRegistryEntry, p: &DiscoveryParameters) -> bool {
    let cap = &entry.capability;

    if let Some(id) = &p.capability_id {
        if &cap.id != id {
            return false;
        }
    }
    if let Some(name) = &p.name {
        if !contains_ci(&cap.name, name) {
            return false;
        }
    }
    if let Some(description) = &p.description {
        if !contains_ci(&cap.description, description) {
            return false;
        }
    }
    if let Some(category) = &p.category {
        if cap.category_id() != Some(category.as_str()) {
            return false;
        }
    }
    if !p.tags.is_empty() {
        let has = |tag: &String| entry.metadata.tags.contains(tag) || cap.tags.contains(tag);
        if !p.tags.iter().all(has) {
            return false;
        }
    }
    if let Some(version) = &p.version {
        if &cap.version != version {
            return false;
        }
    }
    if !p.status.is_empty() && !p.status.contains(&entry.status.status) {
        return false;
    }
    if let Some(module_id) = &p.provider_module_id {
        if &entry.provider.module_id != module_id {
            return false;
        }
    }
    if !p.provider_status.is_empty() && !p.provider_status.contains(&entry.provider.status) {
        return false;
    }
    true
}

fn passes_filters(
    entry: &CapabilityRegistryEntry,
    f: &DiscoveryFilters,
    constraints: &[VersionConstraint],
) -> bool {
    if !constraints
        .iter()
        .all(|c| c.matches(&entry.capability.version))
    {
        return false;
    }
    if f.exclude_statuses.contains(&entry.status.status) {
        return false;
    }

    let provider = &entry.provider;
    if !f.provider.module_ids.is_empty() && !f.provider.module_ids.contains(&provider.module_id) {
        return false;
    }
    if let Some(min) = f.provider.min_priority {
        if provider.priority < min {
            return false;
        }
    }
    if f.provider.exclude_statuses.contains(&provider.status) {
        return false;
    }

    passes_performance(&entry.metrics, &f.performance)
        && passes_resources(&entry.metrics, &f.resources)
        && passes_licensing(entry, &f.licensing)
}

fn passes_performance(m: &CapabilityMetrics, f: &PerformanceFilters) -> bool {
    let at_least = |value: f64, bound: Option<f64>| bound.map_or(true, |b| value >= b);
    let at_most = |value: f64, bound: Option<f64>| bound.map_or(true, |b| value <= b);

    at_least(m.average_response_time_ms, f.min_response_time_ms)
        && at_most(m.average_response_time_ms, f.max_response_time_ms)
        && at_least(m.success_rate, f.min_success_rate)
        && at_most(m.error_rate, f.max_error_rate)
}

fn passes_resources(m: &CapabilityMetrics, f: &ResourceFilters) -> bool {
    let r = &m.resource_usage;
    let within = |current: f64, bound: Option<f64>| bound.map_or(true, |b| current <= b);

    within(r.memory.current, f.max_memory)
        && within(r.cpu.current, f.max_cpu)
        && within(r.storage.current, f.max_storage)
        && within(r.network.current, f.max_network)
}

fn passes_licensing(entry: &CapabilityRegistryEntry, f: &LicensingFilters) -> bool {
    let licensing = entry.metadata.licensing.as_ref();
    if !f.allowed_licenses.is_empty() {
        match licensing {
            Some(l) if f.allowed_licenses.iter().any(|a| a.eq_ignore_ascii_case(&l.license)) => {}
            _ => return false,
        }
    }
    if f.require_commercial && !licensing.map_or(false, |l| l.commercial) {
        return false;
    }
    true
}

/// Sort by the requested field; ties (and unsorted queries) fall back to
/// provider priority, highest first, then capability id.
fn sort_entries(entries: &mut [CapabilityRegistryEntry], options: &DiscoveryOptions) {
    let tie_break = |a: &CapabilityRegistryEntry, b: &CapabilityRegistryEntry| {
        b.provider
            .priority
            .cmp(&a.provider.priority)
            .then_with(|| a.capability.id.cmp(&b.capability.id))
    };

    entries.sort_by(|a, b| {
        let primary = match options.sort_by {
            Some(field) => {
                let ord = compare_field(a, b, field);
                match options.sort_direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
            None => Ordering::Equal,
        };
        primary.then_with(|| tie_break(a, b))
    });
}

fn compare_field(
    a: &CapabilityRegistryEntry,
    b: &CapabilityRegistryEntry,
    field: SortField,
) -> Ordering {
    match field {
        SortField::Name => a
            .capability
            .name
            .to_lowercase()
            .cmp(&b.capability.name.to_lowercase()),
        SortField::Version => compare_versions(&a.capability.version, &b.capability.version),
        SortField::UsageCount => a.metrics.usage_count.cmp(&b.metrics.usage_count),
        SortField::LastUsed => a.metrics.last_used.cmp(&b.metrics.last_used),
        SortField::ResponseTime => a
            .metrics
            .average_response_time_ms
            .total_cmp(&b.metrics.average_response_time_ms),
        SortField::SuccessRate => a.metrics.success_rate.total_cmp(&b.metrics.success_rate),
    }
}

fn shape_entry(
    mut entry: CapabilityRegistryEntry,
    options: &DiscoveryOptions,
) -> CapabilityRegistryEntry {
    if !options.include_metrics {
        entry.metrics = CapabilityMetrics::default();
    }
    if !options.include_metadata {
        entry.metadata = Default::default();
    } else if !options.include_examples {
        entry.metadata.examples.clear();
    }
    entry
}
