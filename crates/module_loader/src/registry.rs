//! The authoritative table of activated modules.

use libloading::Library;
use module_api::Module;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::warn;

/// An activated module and its metadata.
pub struct RegisteredModule {
    // Field order matters: the instance must drop before the library that
    // holds its code and vtable.
    instance: Box<dyn Module>,
    name: String,
    version: String,
    type_name: String,
    package: PathBuf,
    activated_at: SystemTime,
    _library: Option<Arc<Library>>,
}

impl RegisteredModule {
    pub fn new(
        instance: Box<dyn Module>,
        type_name: impl Into<String>,
        package: impl AsRef<Path>,
        library: Option<Arc<Library>>,
    ) -> Self {
        let name = instance.name().to_string();
        let version = instance.version().to_string();
        Self {
            instance,
            name,
            version,
            type_name: type_name.into(),
            package: package.as_ref().to_path_buf(),
            activated_at: SystemTime::now(),
            _library: library,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Exported type the instance was built from
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Package file the module came from
    pub fn package(&self) -> &Path {
        &self.package
    }

    pub fn activated_at(&self) -> SystemTime {
        self.activated_at
    }

    pub fn instance(&self) -> &dyn Module {
        self.instance.as_ref()
    }
}

impl std::fmt::Debug for RegisteredModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredModule")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("type_name", &self.type_name)
            .field("package", &self.package)
            .finish()
    }
}

/// Modules keyed by name, kept in activation order.
///
/// Registering a name that is already present replaces the earlier entry
/// (last writer wins). The replacement moves to the end of the activation
/// order. Writers are serialized by the lock, so for concurrent activations
/// of the same name the later write wins.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<Vec<Arc<RegisteredModule>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a module, returning the entry it replaced.
    pub async fn register(&self, module: RegisteredModule) -> Option<Arc<RegisteredModule>> {
        let mut modules = self.modules.write().await;

        let replaced = modules
            .iter()
            .position(|existing| existing.name() == module.name())
            .map(|index| modules.remove(index));

        if let Some(previous) = &replaced {
            warn!(
                "Module name collision: {} v{} from {} replaces v{} from {}",
                module.name(),
                module.version(),
                module.package().display(),
                previous.version(),
                previous.package().display()
            );
        }

        modules.push(Arc::new(module));
        replaced
    }

    pub async fn get(&self, name: &str) -> Option<Arc<RegisteredModule>> {
        let modules = self.modules.read().await;
        modules.iter().find(|module| module.name() == name).cloned()
    }

    /// All modules in activation order.
    pub async fn all(&self) -> Vec<Arc<RegisteredModule>> {
        self.modules.read().await.clone()
    }

    pub async fn names(&self) -> Vec<String> {
        let modules = self.modules.read().await;
        modules.iter().map(|module| module.name().to_string()).collect()
    }

    pub async fn count(&self) -> usize {
        self.modules.read().await.len()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.get(name).await.is_some()
    }
}
