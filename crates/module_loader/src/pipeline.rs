//! The activation pipeline: discover, load, instantiate, initialize, register.

use crate::error::LoaderError;
use crate::events::{current_timestamp, EventKey, EventNotifier, EventPayload, ModuleActivatedEvent};
use crate::package::{LoadedPackage, PackageLoader};
use crate::registry::{ModuleRegistry, RegisteredModule};
use crate::report::{ActivationOutcome, ActivationReport};
use crate::source::{Candidate, ModuleSource};
use module_api::{panic_message, Module, ModuleConstructor, ModuleExport};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Activates every module a source offers.
///
/// Failures are isolated per candidate and per exported type: a corrupt
/// package, a panicking constructor or a failing init hook is recorded in
/// the report and the run moves on. Only an unreadable source aborts.
pub struct ActivationPipeline {
    loader: Arc<dyn PackageLoader>,
    load_timeout: Option<Duration>,
    notifier: Option<Arc<EventNotifier>>,
}

impl ActivationPipeline {
    pub fn new(loader: Arc<dyn PackageLoader>) -> Self {
        Self {
            loader,
            load_timeout: None,
            notifier: None,
        }
    }

    /// Bounds how long a single package load may take.
    ///
    /// A load that exceeds the limit is recorded as a load failure. The
    /// blocking thread running it cannot be interrupted and is abandoned.
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    /// Publishes a `module_activated` event for every success.
    pub fn with_notifier(mut self, notifier: Arc<EventNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Runs one activation pass of `source` into `registry`.
    ///
    /// Discovery completes before the first package is loaded, so a source
    /// failure leaves the registry untouched.
    pub async fn activate(
        &self,
        source: &dyn ModuleSource,
        registry: &ModuleRegistry,
    ) -> Result<ActivationReport, LoaderError> {
        info!("Searching for modules in {}", source.location());

        let candidates = source.list_candidates().await?;
        let mut report = ActivationReport::new(source.location(), candidates.len());

        if candidates.is_empty() {
            info!("No modules found in {}", source.location());
            return Ok(report);
        }

        info!("Discovered {} module packages", candidates.len());

        for candidate in &candidates {
            self.activate_candidate(candidate, registry, &mut report).await;
        }

        info!(
            "Activation complete: {} modules activated, {} failures",
            report.success_count(),
            report.failure_count()
        );

        Ok(report)
    }

    async fn activate_candidate(
        &self,
        candidate: &Candidate,
        registry: &ModuleRegistry,
        report: &mut ActivationReport,
    ) {
        info!("Loading module package: {}", candidate.path.display());

        let package = match self.load_package(&candidate.path).await {
            Ok(package) => package,
            Err(e) => {
                error!("{}", e);
                record_failure(report, &e);
                return;
            }
        };

        let mut activatable = 0;
        for export in package.exports() {
            let Some(constructor) = export.constructor() else {
                debug!("Skipping abstract export {} in {}", export.type_name, candidate.file_name());
                continue;
            };
            activatable += 1;

            match activate_export(&candidate.path, export, constructor) {
                Ok(instance) => {
                    self.register(candidate, export, instance, &package, registry, report)
                        .await
                }
                Err(e) => {
                    error!("{}", e);
                    record_failure(report, &e);
                }
            }
        }

        if activatable == 0 {
            warn!(
                "Package {} exports no activatable modules",
                candidate.path.display()
            );
        }
    }

    async fn register(
        &self,
        candidate: &Candidate,
        export: &ModuleExport,
        instance: Box<dyn Module>,
        package: &LoadedPackage,
        registry: &ModuleRegistry,
        report: &mut ActivationReport,
    ) {
        let entry = RegisteredModule::new(
            instance,
            export.type_name,
            &candidate.path,
            package.library_handle(),
        );
        let name = entry.name().to_string();
        let version = entry.version().to_string();

        registry.register(entry).await;
        info!("Loaded module: {} - version {}", name, version);

        report.record(ActivationOutcome::Success {
            candidate: candidate.path.clone(),
            name: name.clone(),
            version: version.clone(),
            type_name: export.type_name.to_string(),
        });

        if let Some(notifier) = &self.notifier {
            notifier.publish(
                &EventKey::module_activated(),
                EventPayload::ModuleActivated(ModuleActivatedEvent {
                    name,
                    version,
                    package: candidate.path.clone(),
                    timestamp: current_timestamp(),
                }),
            );
        }
    }

    async fn load_package(&self, path: &Path) -> Result<LoadedPackage, LoaderError> {
        let loader = self.loader.clone();
        let owned_path = path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || loader.load(&owned_path));

        let joined = match self.load_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    return Err(LoaderError::LoadFailure {
                        candidate: path.to_path_buf(),
                        reason: format!("Load timed out after {:?}", limit),
                    })
                }
            },
            None => task.await,
        };

        joined.map_err(|e| LoaderError::LoadFailure {
            candidate: path.to_path_buf(),
            reason: format!("Loader task failed: {}", e),
        })?
    }
}

fn record_failure(report: &mut ActivationReport, error: &LoaderError) {
    if let Some(outcome) = ActivationOutcome::from_error(error) {
        report.record(outcome);
    }
}

/// Constructs one export and runs its init hook.
fn activate_export(
    candidate: &Path,
    export: &ModuleExport,
    constructor: ModuleConstructor,
) -> Result<Box<dyn Module>, LoaderError> {
    let instantiation_failure = |reason: String| LoaderError::InstantiationFailure {
        candidate: candidate.to_path_buf(),
        type_name: export.type_name.to_string(),
        reason,
    };

    let mut instance = catch_unwind(constructor)
        .map_err(|payload| format!("Constructor panicked: {}", panic_message(payload.as_ref())))
        .and_then(|built| built.map_err(|e| e.to_string()))
        .map_err(instantiation_failure)?;

    if instance.name().trim().is_empty() {
        return Err(instantiation_failure(
            "Module reported an empty name".to_string(),
        ));
    }

    let module_name = instance.name().to_string();
    debug!("Initializing module {} ({})", module_name, export.type_name);

    match catch_unwind(AssertUnwindSafe(|| instance.on_load())) {
        Ok(Ok(())) => Ok(instance),
        Ok(Err(e)) => Err(LoaderError::InitFailure {
            candidate: candidate.to_path_buf(),
            module: module_name,
            reason: e.to_string(),
        }),
        Err(payload) => Err(LoaderError::InitFailure {
            candidate: candidate.to_path_buf(),
            module: module_name,
            reason: format!("Init hook panicked: {}", panic_message(payload.as_ref())),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::package::StaticLoader;
    use crate::source::DirectorySource;
    use module_api::{construct_guarded, ModuleError};

    struct Sleepy;

    impl PackageLoader for Sleepy {
        fn load(&self, path: &Path) -> Result<LoadedPackage, LoaderError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(LoadedPackage::linked(path, Vec::new()))
        }
    }

    struct Nameless;

    impl Module for Nameless {
        fn name(&self) -> &str {
            ""
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn on_load(&mut self) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    fn build_nameless() -> Result<Box<dyn Module>, ModuleError> {
        construct_guarded(|| Nameless)
    }

    fn directory_with(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            std::fs::write(dir.path().join(file), b"package").unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_load_timeout_is_load_failure() {
        let dir = directory_with(&["slow.mod"]);
        let pipeline = ActivationPipeline::new(Arc::new(Sleepy))
            .with_load_timeout(Duration::from_millis(20));
        let registry = ModuleRegistry::new();

        let report = pipeline
            .activate(&DirectorySource::with_extension(dir.path(), "mod"), &registry)
            .await
            .unwrap();

        assert_eq!(report.failures_of(FailureKind::LoadFailure), 1);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_name_is_instantiation_failure() {
        let dir = directory_with(&["nameless.mod"]);
        let loader = StaticLoader::new().with_package(
            "nameless.mod",
            vec![ModuleExport::concrete("Nameless", build_nameless)],
        );
        let pipeline = ActivationPipeline::new(Arc::new(loader));
        let registry = ModuleRegistry::new();

        let report = pipeline
            .activate(&DirectorySource::with_extension(dir.path(), "mod"), &registry)
            .await
            .unwrap();

        assert_eq!(report.failures_of(FailureKind::InstantiationFailure), 1);
        assert_eq!(registry.count().await, 0);
    }
}
