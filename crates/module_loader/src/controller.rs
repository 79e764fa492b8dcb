//! The single entry point a host calls at startup.

use crate::config::LoaderConfig;
use crate::error::LoaderError;
use crate::events::{current_timestamp, EventKey, EventNotifier, EventPayload, LoaderStartedEvent};
use crate::package::{DylibLoader, PackageLoader};
use crate::pipeline::ActivationPipeline;
use crate::registry::ModuleRegistry;
use crate::report::{ActivationOutcome, ActivationReport};
use crate::source::DirectorySource;
use futures::FutureExt;
use module_api::panic_message;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Name the controller announces itself with.
pub const LOADER_NAME: &str = "module_loader";
/// Version the controller announces itself with.
pub const LOADER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Orchestrates storage setup, activation and the startup announcement.
pub struct LifecycleController {
    config: LoaderConfig,
    registry: Arc<ModuleRegistry>,
    notifier: Arc<EventNotifier>,
    pipeline: ActivationPipeline,
    startup_listener_subscribed: AtomicBool,
}

impl LifecycleController {
    /// Creates a controller loading native libraries from the configured directory.
    pub fn new(config: LoaderConfig) -> Self {
        Self::with_loader(config, Arc::new(DylibLoader::new()))
    }

    pub fn with_loader(config: LoaderConfig, loader: Arc<dyn PackageLoader>) -> Self {
        Self::with_parts(
            config,
            loader,
            Arc::new(ModuleRegistry::new()),
            Arc::new(EventNotifier::new()),
        )
    }

    /// Creates a controller sharing a registry and notifier owned by the host.
    pub fn with_parts(
        config: LoaderConfig,
        loader: Arc<dyn PackageLoader>,
        registry: Arc<ModuleRegistry>,
        notifier: Arc<EventNotifier>,
    ) -> Self {
        let mut pipeline = ActivationPipeline::new(loader).with_notifier(notifier.clone());
        if let Some(timeout) = config.load_timeout() {
            pipeline = pipeline.with_load_timeout(timeout);
        }

        Self {
            config,
            registry,
            notifier,
            pipeline,
            startup_listener_subscribed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<ModuleRegistry> {
        self.registry.clone()
    }

    pub fn notifier(&self) -> Arc<EventNotifier> {
        self.notifier.clone()
    }

    /// Runs the startup sequence.
    ///
    /// 1. Creates the module and log directories if they are missing
    /// 2. Activates every module in the module directory
    /// 3. Subscribes the baseline listener for the startup event (first run only)
    /// 4. Publishes the startup event
    ///
    /// Never fails: errors and panics are logged and `None` is returned.
    /// A source that cannot be read stops the sequence before step 3.
    pub async fn init(&self) -> Option<ActivationReport> {
        info!("{} v{} starting", LOADER_NAME, LOADER_VERSION);

        match AssertUnwindSafe(self.run()).catch_unwind().await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(e)) => {
                error!("{} failed during startup: {}", LOADER_NAME, e);
                None
            }
            Err(payload) => {
                error!(
                    "{} panicked during startup: {}",
                    LOADER_NAME,
                    panic_message(payload.as_ref())
                );
                None
            }
        }
    }

    async fn run(&self) -> Result<ActivationReport, LoaderError> {
        self.ensure_storage_layout().await;

        let source =
            DirectorySource::with_extension(&self.config.module_directory, &self.config.extension);
        let report = self.pipeline.activate(&source, &self.registry).await?;
        log_report(&report);

        self.announce_startup().await;
        Ok(report)
    }

    async fn ensure_storage_layout(&self) {
        ensure_directory(&self.config.module_directory).await;
        ensure_directory(&self.config.log_directory).await;
    }

    async fn announce_startup(&self) {
        let key = match EventKey::new(self.config.startup_event.clone()) {
            Ok(key) => key,
            Err(e) => {
                warn!("Startup event not registered: {}", e);
                return;
            }
        };

        // Subscribed on the first successful run only
        if !self.startup_listener_subscribed.swap(true, Ordering::SeqCst) {
            self.notifier.subscribe(&key, "startup_logger", |event| {
                if let EventPayload::LoaderStarted(started) = &event.payload {
                    info!(
                        "{} v{} is running with {} modules",
                        started.loader,
                        started.version,
                        started.modules.len()
                    );
                }
                Ok(())
            });
            info!("Registered listener for event: {}", key);
        }

        let payload = EventPayload::LoaderStarted(LoaderStartedEvent {
            loader: LOADER_NAME.to_string(),
            version: LOADER_VERSION.to_string(),
            module_directory: self.config.module_directory.clone(),
            modules: self.registry.names().await,
            timestamp: current_timestamp(),
        });

        let delivery = self.notifier.publish(&key, payload);
        debug!(
            "Startup event {} delivered to {} listeners ({} failed)",
            key, delivery.delivered, delivery.failed
        );
    }
}

/// Creates `path` if it does not exist. Failures are logged only; a
/// missing module directory surfaces later as an unavailable source.
async fn ensure_directory(path: &Path) {
    if path.is_dir() {
        return;
    }

    match tokio::fs::create_dir_all(path).await {
        Ok(()) => info!("Created directory: {}", path.display()),
        Err(e) => warn!("Failed to create directory {}: {}", path.display(), e),
    }
}

fn log_report(report: &ActivationReport) {
    for outcome in &report.outcomes {
        match outcome {
            ActivationOutcome::Success {
                candidate,
                name,
                version,
                ..
            } => info!("  ✓ {} v{} ({})", name, version, candidate.display()),
            ActivationOutcome::Failure {
                candidate,
                type_name,
                kind,
                reason,
            } => warn!(
                "  ✗ {}{}: {}: {}",
                candidate.display(),
                type_name
                    .as_ref()
                    .map(|t| format!(" [{}]", t))
                    .unwrap_or_default(),
                kind,
                reason
            ),
        }
    }

    info!(
        "Activated {} modules from {} packages in {} ({} failures)",
        report.success_count(),
        report.candidates,
        report.source,
        report.failure_count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::StaticLoader;
    use std::sync::Mutex;

    fn config_in(root: &Path) -> LoaderConfig {
        LoaderConfig {
            module_directory: root.join("plugins"),
            log_directory: root.join("logs"),
            extension: "mod".to_string(),
            ..LoaderConfig::default()
        }
    }

    #[tokio::test]
    async fn test_init_creates_storage_layout() {
        let root = tempfile::tempdir().unwrap();
        let controller =
            LifecycleController::with_loader(config_in(root.path()), Arc::new(StaticLoader::new()));

        let report = controller.init().await.unwrap();
        assert!(report.is_empty());
        assert!(root.path().join("plugins").is_dir());
        assert!(root.path().join("logs").is_dir());
    }

    #[tokio::test]
    async fn test_init_keeps_existing_directory_contents() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("logs")).unwrap();
        std::fs::write(root.path().join("logs/previous.log"), b"keep me").unwrap();

        let controller =
            LifecycleController::with_loader(config_in(root.path()), Arc::new(StaticLoader::new()));
        controller.init().await;

        assert!(root.path().join("logs/previous.log").exists());
    }

    #[tokio::test]
    async fn test_startup_event_published_once() {
        let root = tempfile::tempdir().unwrap();
        let controller =
            LifecycleController::with_loader(config_in(root.path()), Arc::new(StaticLoader::new()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        controller
            .notifier()
            .subscribe(&EventKey::plugin_loaded(), "test", move |event| {
                if let EventPayload::LoaderStarted(started) = &event.payload {
                    seen_clone.lock().unwrap().push(started.loader.clone());
                }
                Ok(())
            });

        controller.init().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![LOADER_NAME.to_string()]);
        assert_eq!(controller.notifier().listener_count(&EventKey::plugin_loaded()), 2);
    }

    #[tokio::test]
    async fn test_repeated_init_subscribes_baseline_listener_once() {
        let root = tempfile::tempdir().unwrap();
        let controller =
            LifecycleController::with_loader(config_in(root.path()), Arc::new(StaticLoader::new()));

        let announcements = Arc::new(Mutex::new(0));
        let announcements_clone = announcements.clone();
        controller
            .notifier()
            .subscribe(&EventKey::plugin_loaded(), "counter", move |_| {
                *announcements_clone.lock().unwrap() += 1;
                Ok(())
            });

        controller.init().await.unwrap();
        controller.init().await.unwrap();

        assert_eq!(*announcements.lock().unwrap(), 2);
        assert_eq!(controller.notifier().listener_count(&EventKey::plugin_loaded()), 2);
    }

    #[tokio::test]
    async fn test_config_accessor_returns_settings() {
        let root = tempfile::tempdir().unwrap();
        let config = LoaderConfig {
            load_timeout_ms: Some(250),
            ..config_in(root.path())
        };
        let controller = LifecycleController::with_loader(config, Arc::new(StaticLoader::new()));

        assert_eq!(
            controller.config().load_timeout(),
            Some(std::time::Duration::from_millis(250))
        );
        assert_eq!(controller.config().module_directory, root.path().join("plugins"));
    }

    #[tokio::test]
    async fn test_invalid_startup_event_skips_announcement() {
        let root = tempfile::tempdir().unwrap();
        let config = LoaderConfig {
            startup_event: "  ".to_string(),
            ..config_in(root.path())
        };
        let controller = LifecycleController::with_loader(config, Arc::new(StaticLoader::new()));

        let report = controller.init().await;
        assert!(report.is_some());
        assert_eq!(controller.notifier().listener_count(&EventKey::plugin_loaded()), 0);
    }

    #[tokio::test]
    async fn test_unusable_module_directory_is_swallowed() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("plugins");
        std::fs::write(&blocker, b"a file where the directory should be").unwrap();

        let controller =
            LifecycleController::with_loader(config_in(root.path()), Arc::new(StaticLoader::new()));

        assert!(controller.init().await.is_none());
        assert_eq!(controller.registry().count().await, 0);
        assert_eq!(controller.notifier().listener_count(&EventKey::plugin_loaded()), 0);
    }
}
