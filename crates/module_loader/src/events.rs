//! Synchronous publish/subscribe for loader lifecycle events.

use crate::error::LoaderError;
use dashmap::DashMap;
use module_api::panic_message;
use serde::Serialize;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

/// Published once by the lifecycle controller after startup.
pub const PLUGIN_LOADED: &str = "plugin_loaded";
/// Published once per successfully activated module.
pub const MODULE_ACTIVATED: &str = "module_activated";

/// Validated event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey(String);

impl EventKey {
    /// Rejects empty and whitespace-only names.
    pub fn new(name: impl Into<String>) -> Result<Self, LoaderError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LoaderError::InvalidEventName(name));
        }
        Ok(Self(name))
    }

    pub fn plugin_loaded() -> Self {
        Self(PLUGIN_LOADED.to_string())
    }

    pub fn module_activated() -> Self {
        Self(MODULE_ACTIVATED.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of the lifecycle controller handed to startup listeners.
#[derive(Debug, Clone, Serialize)]
pub struct LoaderStartedEvent {
    pub loader: String,
    pub version: String,
    pub module_directory: PathBuf,
    pub modules: Vec<String>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleActivatedEvent {
    pub name: String,
    pub version: String,
    pub package: PathBuf,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    LoaderStarted(LoaderStartedEvent),
    ModuleActivated(ModuleActivatedEvent),
}

/// An event as seen by listeners.
#[derive(Debug, Clone)]
pub struct LoaderEvent {
    pub key: EventKey,
    pub payload: EventPayload,
}

/// Listener callback. Errors and panics are contained by the notifier.
pub type Listener = Arc<dyn Fn(&LoaderEvent) -> Result<(), LoaderError> + Send + Sync>;

struct Subscription {
    name: String,
    listener: Listener,
}

/// Result of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Delivers events to listeners in subscription order on the caller's task.
///
/// `publish` works on a snapshot of the listener list, so listeners
/// subscribed during delivery only see later events. There is no replay.
#[derive(Default)]
pub struct EventNotifier {
    listeners: DashMap<EventKey, Vec<Arc<Subscription>>>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener` to `key` under a name used in failure logs.
    pub fn subscribe<F>(&self, key: &EventKey, listener_name: &str, listener: F)
    where
        F: Fn(&LoaderEvent) -> Result<(), LoaderError> + Send + Sync + 'static,
    {
        let subscription = Arc::new(Subscription {
            name: listener_name.to_string(),
            listener: Arc::new(listener),
        });

        self.listeners
            .entry(key.clone())
            .or_insert_with(Vec::new)
            .push(subscription);

        debug!("Subscribed {} to {}", listener_name, key);
    }

    /// Delivers `payload` to every listener of `key`.
    pub fn publish(&self, key: &EventKey, payload: EventPayload) -> DeliveryReport {
        // Clone the list so the map shard is unlocked while listeners run
        let subscriptions = self
            .listeners
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let mut report = DeliveryReport::default();
        if subscriptions.is_empty() {
            debug!("No listeners for {}", key);
            return report;
        }

        let event = LoaderEvent {
            key: key.clone(),
            payload,
        };

        for subscription in subscriptions.iter() {
            let outcome = catch_unwind(AssertUnwindSafe(|| (subscription.listener)(&event)))
                .unwrap_or_else(|payload| {
                    Err(LoaderError::ListenerFailure {
                        event: key.to_string(),
                        reason: format!("listener panicked: {}", panic_message(payload.as_ref())),
                    })
                });

            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    error!("Listener {} failed on {}: {}", subscription.name, key, e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    pub fn listener_count(&self, key: &EventKey) -> usize {
        self.listeners.get(key).map(|entry| entry.len()).unwrap_or(0)
    }
}

/// Returns the current Unix timestamp in seconds.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
