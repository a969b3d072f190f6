use std::sync::Arc;

use {
    async_trait::async_trait,
    chatdesk_common::ProviderId,
    serde_json::{Value, json},
    tokio::sync::OnceCell,
};

use crate::{catalog::CatalogSummary, enforcer::ModelDelta, provider::Provider};

/// Topic for provider status changes.
pub const STATUS_TOPIC: &str = "providers.status";
/// Topic for catalog replacements and committed flag changes.
pub const MODELS_TOPIC: &str = "providers.models";

/// Callback for publishing events to connected clients.
///
/// The gateway wires this up to its push channel so this crate doesn't
/// depend on transport types.
#[async_trait]
pub trait SetupBroadcaster: Send + Sync {
    async fn broadcast(&self, topic: &str, payload: Value);
}

#[derive(Clone, Default)]
pub(crate) struct Events(Arc<OnceCell<Arc<dyn SetupBroadcaster>>>);

impl Events {
    pub fn set(&self, broadcaster: Arc<dyn SetupBroadcaster>) {
        let _ = self.0.set(broadcaster);
    }

    pub async fn status(&self, provider: &Provider) {
        let Some(broadcaster) = self.0.get() else {
            return;
        };
        let payload = serde_json::to_value(provider).unwrap_or_default();
        broadcaster.broadcast(STATUS_TOPIC, payload).await;
    }

    pub async fn models(
        &self,
        provider: &ProviderId,
        revision: u64,
        summary: &CatalogSummary,
        changed: &[ModelDelta],
    ) {
        let Some(broadcaster) = self.0.get() else {
            return;
        };
        broadcaster
            .broadcast(
                MODELS_TOPIC,
                json!({
                    "provider": provider,
                    "revision": revision,
                    "summary": summary,
                    "changed": changed,
                }),
            )
            .await;
    }
}

#[cfg(test)]
pub(crate) mod recorder {
    use std::sync::Mutex;

    use super::*;

    /// Broadcaster that keeps every event it receives.
    #[derive(Default)]
    pub(crate) struct RecordingBroadcaster(Mutex<Vec<(String, Value)>>);

    impl RecordingBroadcaster {
        pub fn events(&self) -> Vec<(String, Value)> {
            self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        /// Status states announced so far, in order.
        pub fn states(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter(|(topic, _)| topic == STATUS_TOPIC)
                .filter_map(|(_, payload)| {
                    payload["status"]["state"].as_str().map(str::to_string)
                })
                .collect()
        }
    }

    #[async_trait]
    impl SetupBroadcaster for RecordingBroadcaster {
        async fn broadcast(&self, topic: &str, payload: Value) {
            self.0
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((topic.to_string(), payload));
        }
    }
}
