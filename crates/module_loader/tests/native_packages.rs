//! Activation of real native libraries through `DylibLoader`.
//!
//! The `echo_module` and `faulty_module` packages are built once into a
//! separate target directory and copied into per-test module directories.

use module_loader::{
    ActivationOutcome, ActivationPipeline, DirectorySource, DylibLoader, FailureKind,
    LifecycleController, LoaderConfig, ModuleRegistry, PackageLoader,
};
use std::env::consts::{DLL_EXTENSION, DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, OnceLock};

const PACKAGES: [&str; 2] = ["echo_module", "faulty_module"];

/// Builds the package crates and returns the directory holding the libraries.
fn package_artifacts() -> &'static Path {
    static ARTIFACTS: OnceLock<PathBuf> = OnceLock::new();

    ARTIFACTS.get_or_init(|| {
        let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let target_dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join("native-packages");
        let cargo = std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());

        let mut command = Command::new(cargo);
        command
            .arg("build")
            .arg("--manifest-path")
            .arg(workspace.join("Cargo.toml"))
            .arg("--target-dir")
            .arg(&target_dir);
        for package in PACKAGES {
            command.arg("-p").arg(package);
        }

        let output = command.output().expect("failed to run cargo");
        assert!(
            output.status.success(),
            "building module packages failed:\n{}",
            String::from_utf8_lossy(&output.stderr)
        );

        target_dir.join("debug")
    })
}

fn artifact(package: &str) -> PathBuf {
    package_artifacts().join(format!("{}{}{}", DLL_PREFIX, package, DLL_SUFFIX))
}

/// Copies `package` into `dir` as `<stem>.<platform extension>`.
fn install(dir: &Path, package: &str, stem: &str) -> PathBuf {
    let destination = dir.join(format!("{}.{}", stem, DLL_EXTENSION));
    std::fs::copy(artifact(package), &destination).unwrap();
    destination
}

fn write_corrupt(dir: &Path, stem: &str) -> PathBuf {
    let path = dir.join(format!("{}.{}", stem, DLL_EXTENSION));
    std::fs::write(&path, b"this is not a shared library").unwrap();
    path
}

fn file_name(outcome: &ActivationOutcome) -> String {
    outcome
        .candidate()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .to_string()
}

#[tokio::test]
async fn echo_library_and_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let echo_path = install(dir.path(), "echo_module", "echo");
    write_corrupt(dir.path(), "bad");

    let registry = ModuleRegistry::new();
    let report = {
        let pipeline = ActivationPipeline::new(Arc::new(DylibLoader::new()));
        pipeline
            .activate(&DirectorySource::new(dir.path()), &registry)
            .await
            .unwrap()
    };

    assert_eq!(report.candidates, 2);
    assert_eq!(report.outcomes.len(), 2);

    assert_eq!(file_name(&report.outcomes[0]), format!("bad.{}", DLL_EXTENSION));
    assert_eq!(report.outcomes[0].failure_kind(), Some(FailureKind::LoadFailure));

    match &report.outcomes[1] {
        ActivationOutcome::Success {
            candidate,
            name,
            version,
            type_name,
        } => {
            assert_eq!(candidate, &echo_path);
            assert_eq!(name, "Echo");
            assert_eq!(version, "1.0.0");
            assert_eq!(type_name, "EchoModule");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    assert_eq!(registry.names().await, vec!["Echo"]);

    // The pipeline and its loader are gone; the registry entry keeps the
    // library mapped.
    let echo = registry.get("Echo").await.unwrap();
    assert_eq!(echo.instance().name(), "Echo");
    assert_eq!(echo.instance().version(), "1.0.0");
    assert_eq!(echo.package(), echo_path.as_path());
}

#[test]
fn dylib_loader_reads_declaration() {
    let dir = tempfile::tempdir().unwrap();
    let path = install(dir.path(), "faulty_module", "faulty");

    let package = DylibLoader::new().load(&path).unwrap();

    let names: Vec<&str> = package.exports().iter().map(|export| export.type_name).collect();
    assert_eq!(names, vec!["Steady", "Volatile", "Anonymous", "Stillborn"]);
    assert_eq!(package.activatable_exports().count(), 4);
    assert!(package.library_handle().is_some());
    assert_eq!(package.path(), path.as_path());
}

#[tokio::test]
async fn panics_inside_library_are_contained() {
    let dir = tempfile::tempdir().unwrap();
    install(dir.path(), "faulty_module", "faulty");

    let registry = ModuleRegistry::new();
    let pipeline = ActivationPipeline::new(Arc::new(DylibLoader::new()));
    let report = pipeline
        .activate(&DirectorySource::new(dir.path()), &registry)
        .await
        .unwrap();

    assert_eq!(report.activated_names(), vec!["Steady"]);
    assert_eq!(report.failures_of(FailureKind::InitFailure), 1);
    assert_eq!(report.failures_of(FailureKind::InstantiationFailure), 2);

    let failures: Vec<(Option<&str>, FailureKind, &str)> = report
        .failures()
        .map(|outcome| match outcome {
            ActivationOutcome::Failure {
                type_name,
                kind,
                reason,
                ..
            } => (type_name.as_deref(), *kind, reason.as_str()),
            ActivationOutcome::Success { .. } => unreachable!(),
        })
        .collect();

    assert_eq!(failures[0].0, Some("Volatile"));
    assert_eq!(failures[0].1, FailureKind::InitFailure);
    assert!(failures[0].2.contains("volatile init hook"));

    assert_eq!(failures[1].0, Some("Anonymous"));
    assert_eq!(failures[1].1, FailureKind::InstantiationFailure);

    assert_eq!(failures[2].0, Some("Stillborn"));
    assert!(failures[2].2.contains("stillborn constructor"));

    assert_eq!(registry.names().await, vec!["Steady"]);
    assert!(registry.get("Volatile").await.is_none());
}

#[tokio::test]
async fn controller_activates_native_packages() {
    let root = tempfile::tempdir().unwrap();
    let modules = root.path().join("plugins");
    std::fs::create_dir_all(&modules).unwrap();
    install(&modules, "echo_module", "echo");
    install(&modules, "faulty_module", "faulty");
    write_corrupt(&modules, "broken");

    let config = LoaderConfig {
        module_directory: modules,
        log_directory: root.path().join("logs"),
        ..LoaderConfig::default()
    };
    let controller = LifecycleController::new(config);

    let report = controller.init().await.unwrap();

    assert_eq!(report.candidates, 3);
    assert_eq!(report.activated_names(), vec!["Echo", "Steady"]);
    assert_eq!(report.failures_of(FailureKind::LoadFailure), 1);
    assert_eq!(controller.registry().count().await, 2);
}
