//! Module discovery and activation engine.
//!
//! Scans a directory for module packages, loads each one, instantiates every
//! exported type implementing [`module_api::Module`], runs its init hook and
//! keeps the result in a [`ModuleRegistry`].
//!
//! Failures are isolated per candidate: one corrupt package never prevents
//! the others from loading. Everything that went wrong is listed in the
//! [`ActivationReport`] returned by each run.
//!
//! ```rust,no_run
//! use module_loader::{LifecycleController, LoaderConfig};
//!
//! # async fn example() {
//! let controller = LifecycleController::new(LoaderConfig::default());
//! if let Some(report) = controller.init().await {
//!     println!("{} modules active", report.success_count());
//! }
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod package;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod source;

pub use config::LoaderConfig;
pub use controller::{LifecycleController, LOADER_NAME, LOADER_VERSION};
pub use error::{FailureKind, LoaderError};
pub use events::{
    current_timestamp, DeliveryReport, EventKey, EventNotifier, EventPayload, LoaderEvent,
    LoaderStartedEvent, ModuleActivatedEvent, MODULE_ACTIVATED, PLUGIN_LOADED,
};
pub use package::{DylibLoader, LoadedPackage, PackageLoader, StaticLoader};
pub use pipeline::ActivationPipeline;
pub use registry::{ModuleRegistry, RegisteredModule};
pub use report::{ActivationOutcome, ActivationReport};
pub use source::{Candidate, DirectorySource, ModuleSource};

/// Creates a lifecycle controller loading native libraries.
pub fn create_lifecycle_controller(config: LoaderConfig) -> LifecycleController {
    LifecycleController::new(config)
}
