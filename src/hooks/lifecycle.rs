//! Lifecycle listener traits: the seam to the hosting module loader.
//!
//! The registry notifies listeners after every successful registration,
//! unregistration and status change. Listeners observe; they cannot veto.
//!
//! # Design Principles
//!
//! - All methods have default no-op implementations → implementors pick what they need.
//! - `&self` receivers → listeners are shared-immutable, interior mutability via atomics/channels.
//! - `Send + Sync + 'static` bounds → listeners are registered once and called from any task.
//! - Errors and panics are logged by [`LifecycleHooks`] and never roll back the mutation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capabilities::capability::{Capability, Provider};
use crate::capabilities::entry::{CapabilityRegistryEntry, StatusTransition};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    /// A capability was registered and is now available.
    Activated,
    /// A capability was unregistered and removed from the store.
    Deactivated,
    /// A registered capability changed lifecycle state.
    StatusChanged,
}

/// Payload handed to every listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityLifecycleEvent {
    pub event_id: String,
    pub kind: LifecycleEventKind,
    pub capability: Capability,
    pub provider: Provider,
    /// Full entry after the mutation (for deactivation: the final record
    /// before removal, ending in an `unavailable` transition).
    pub entry: Option<CapabilityRegistryEntry>,
    /// The transition that triggered the event, if any.
    pub transition: Option<StatusTransition>,
    pub timestamp: DateTime<Utc>,
}

impl CapabilityLifecycleEvent {
    pub fn new(kind: LifecycleEventKind, entry: &CapabilityRegistryEntry) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            kind,
            capability: entry.capability.clone(),
            provider: entry.provider.clone(),
            entry: Some(entry.clone()),
            transition: entry.status.last_transition().cloned(),
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// LifecycleListener
// ---------------------------------------------------------------------------

/// Observer for capability lifecycle events.
///
/// # Example
///
/// ```ignore
/// struct ModuleLoaderBridge { tx: tokio::sync::mpsc::Sender<String> }
///
/// #[async_trait]
/// impl LifecycleListener for ModuleLoaderBridge {
///     async fn after_activation(&self, event: &CapabilityLifecycleEvent) -> Result<(), HookError> {
///         self.tx.send(event.capability.id.clone()).await.map_err(|e| e.to_string().into())
///     }
/// }
/// ```
#[async_trait]
pub trait LifecycleListener: Send + Sync + 'static {
    /// Name used in log messages.
    fn name(&self) -> &str {
        "lifecycle-listener"
    }

    /// Called once after a capability is registered.
    async fn after_activation(&self, _event: &CapabilityLifecycleEvent) -> Result<(), HookError> {
        Ok(())
    }

    /// Called once after a capability is unregistered.
    async fn after_deactivation(
        &self,
        _event: &CapabilityLifecycleEvent,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Called once after a capability changes state via `set_status`.
    async fn on_status_change(&self, _event: &CapabilityLifecycleEvent) -> Result<(), HookError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HookError
// ---------------------------------------------------------------------------

/// Error type for listener invocations.
///
/// Listeners return `HookError` to signal problems. The registry logs listener
/// errors and continues (listeners are advisory). A panicking listener is
/// treated the same way.
#[derive(Debug, Clone)]
pub struct HookError {
    pub message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for HookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HookError: {}", self.message)
    }
}

impl std::error::Error for HookError {}

impl From<String> for HookError {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for HookError {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// LifecycleHooks
// ---------------------------------------------------------------------------

/// Ordered set of lifecycle listeners.
///
/// Listeners are invoked in registration order; every listener sees every
/// event regardless of earlier failures.
#[derive(Default, Clone)]
pub struct LifecycleHooks {
    listeners: Vec<Arc<dyn LifecycleListener>>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: impl LifecycleListener) {
        self.listeners.push(Arc::new(listener));
    }

    pub fn register_arc(&mut self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver an event to every listener. Returns how many listeners failed.
    ///
    /// Each listener runs in its own Tokio task, so a listener that panics is
    /// counted as a failure instead of unwinding into the caller.
    pub async fn dispatch(&self, event: &CapabilityLifecycleEvent) -> usize {
        let mut failures = 0;
        for listener in &self.listeners {
            let name = listener.name().to_string();
            let task = {
                let listener = Arc::clone(listener);
                let event = event.clone();
                tokio::spawn(async move {
                    match event.kind {
                        LifecycleEventKind::Activated => listener.after_activation(&event).await,
                        LifecycleEventKind::Deactivated => {
                            listener.after_deactivation(&event).await
                        }
                        LifecycleEventKind::StatusChanged => {
                            listener.on_status_change(&event).await
                        }
                    }
                })
            };
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(join) if join.is_panic() => Err(HookError::new("listener panicked")),
                Err(join) => Err(HookError::new(join.to_string())),
            };
            if let Err(e) = outcome {
                failures += 1;
                log::warn!(
                    "Lifecycle listener '{}' failed on {:?} for '{}': {}",
                    name,
                    event.kind,
                    event.capability.id,
                    e
                );
            }
        }
        failures
    }
}

impl std::fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        activations: AtomicUsize,
        deactivations: AtomicUsize,
    }

    #[async_trait]
    impl LifecycleListener for Arc<Counting> {
        async fn after_activation(&self, _e: &CapabilityLifecycleEvent) -> Result<(), HookError> {
            self.activations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn after_deactivation(&self, _e: &CapabilityLifecycleEvent) -> Result<(), HookError> {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl LifecycleListener for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        async fn after_activation(&self, _e: &CapabilityLifecycleEvent) -> Result<(), HookError> {
            Err("listener offline".into())
        }
    }

    struct Panicking;

    #[async_trait]
    impl LifecycleListener for Panicking {
        async fn after_activation(&self, _e: &CapabilityLifecycleEvent) -> Result<(), HookError> {
            panic!("listener bug");
        }
    }

    fn event(kind: LifecycleEventKind) -> CapabilityLifecycleEvent {
        let entry = CapabilityRegistryEntry::new(
            Capability::new("pdf.export", "PDF Export", "1.0.0"),
            Provider::new("docgen", "1.0.0"),
            vec![],
            Utc::now(),
        );
        CapabilityLifecycleEvent::new(kind, &entry)
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_kind() {
        let counting = Arc::new(Counting::default());
        let mut hooks = LifecycleHooks::new();
        hooks.register(counting.clone());

        assert_eq!(hooks.dispatch(&event(LifecycleEventKind::Activated)).await, 0);
        assert_eq!(hooks.dispatch(&event(LifecycleEventKind::Deactivated)).await, 0);
        assert_eq!(hooks.dispatch(&event(LifecycleEventKind::StatusChanged)).await, 0);

        assert_eq!(counting.activations.load(Ordering::SeqCst), 1);
        assert_eq!(counting.deactivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_listeners() {
        let counting = Arc::new(Counting::default());
        let mut hooks = LifecycleHooks::new();
        hooks.register(Failing);
        hooks.register(counting.clone());

        assert_eq!(hooks.dispatch(&event(LifecycleEventKind::Activated)).await, 1);
        assert_eq!(counting.activations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_listener_is_contained() {
        let counting = Arc::new(Counting::default());
        let mut hooks = LifecycleHooks::new();
        hooks.register(Panicking);
        hooks.register(counting.clone());

        assert_eq!(hooks.dispatch(&event(LifecycleEventKind::Activated)).await, 1);
        assert_eq!(counting.activations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_carries_last_transition() {
        let e = event(LifecycleEventKind::Activated);
        assert_eq!(e.transition.unwrap().reason, "capability_registration");
        assert!(e.entry.is_some());
    }

    #[test]
    fn test_hook_error() {
        let err = HookError::new("test error");
        assert_eq!(err.to_string(), "HookError: test error");

        let err: HookError = "from str".into();
        assert_eq!(err.message, "from str");

        let err: HookError = String::from("from string").into();
        assert_eq!(err.message, "from string");
    }

    #[test]
    fn test_hooks_debug() {
        let hooks = LifecycleHooks::new();
        let debug = format!("{:?}", hooks);
        assert!(debug.contains("LifecycleHooks"));
        assert!(debug.contains("listeners: 0"));
    }
}
