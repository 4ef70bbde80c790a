//! Usage analytics for capability lookups.
//!
//! Every successful `get_capability` produces a [`UsageEvent`] that is handed
//! to the configured [`AnalyticsCollector`]. Delivery is fire-and-forget: the
//! event is spawned onto the current Tokio runtime and the lookup returns
//! without waiting. Collector failures are logged and otherwise ignored.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::hooks::HookError;

/// One capability lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub capability_id: String,
    pub provider_module_id: String,
    /// Usage count after this lookup.
    pub usage_count: u64,
    pub timestamp: DateTime<Utc>,
}

/// Sink for usage events.
#[async_trait]
pub trait AnalyticsCollector: Send + Sync + 'static {
    async fn record_usage(&self, event: UsageEvent) -> Result<(), HookError>;
}

/// Collector that keeps events in memory, for tests and local inspection.
#[derive(Debug, Default)]
pub struct InMemoryAnalytics {
    events: Mutex<Vec<UsageEvent>>,
}

impl InMemoryAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AnalyticsCollector for InMemoryAnalytics {
    async fn record_usage(&self, event: UsageEvent) -> Result<(), HookError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Hand `event` to `collector` without waiting for it.
///
/// Outside a Tokio runtime the event is dropped.
pub fn dispatch_usage(collector: Arc<dyn AnalyticsCollector>, event: UsageEvent) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                let id = event.capability_id.clone();
                if let Err(e) = collector.record_usage(event).await {
                    log::debug!("Analytics collector failed for '{}': {}", id, e);
                }
            });
        }
        Err(_) => {
            log::debug!(
                "No async runtime; dropping usage event for '{}'",
                event.capability_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> UsageEvent {
        UsageEvent {
            capability_id: id.to_string(),
            provider_module_id: "docgen".to_string(),
            usage_count: 1,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_background() {
        let analytics = Arc::new(InMemoryAnalytics::new());
        dispatch_usage(analytics.clone(), event("pdf.export"));

        for _ in 0..50 {
            if !analytics.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(analytics.events()[0].capability_id, "pdf.export");
    }

    #[test]
    fn test_dispatch_without_runtime_is_a_noop() {
        let analytics = Arc::new(InMemoryAnalytics::new());
        dispatch_usage(analytics.clone(), event("pdf.export"));
        assert!(analytics.is_empty());
    }
}
