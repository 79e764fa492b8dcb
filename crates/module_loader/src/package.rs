//! Turning candidate files into lists of exported module types.

use crate::error::LoaderError;
use libloading::{Library, Symbol};
use module_api::{ModuleDeclaration, ModuleExport, ABI_VERSION, DECLARATION_SYMBOL};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A package that loaded successfully.
///
/// When the package came from a dynamic library, the library handle travels
/// with it so that the exports (and every instance built from them) stay
/// valid.
pub struct LoadedPackage {
    path: PathBuf,
    exports: Vec<ModuleExport>,
    library: Option<Arc<Library>>,
}

impl LoadedPackage {
    /// A package whose code is linked into the host.
    pub fn linked(path: impl AsRef<Path>, exports: Vec<ModuleExport>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            exports,
            library: None,
        }
    }

    fn dynamic(path: &Path, exports: Vec<ModuleExport>, library: Library) -> Self {
        Self {
            path: path.to_path_buf(),
            exports,
            library: Some(Arc::new(library)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exports(&self) -> &[ModuleExport] {
        &self.exports
    }

    /// Exports that can be instantiated, in declaration order.
    pub fn activatable_exports(&self) -> impl Iterator<Item = &ModuleExport> {
        self.exports.iter().filter(|export| export.is_activatable())
    }

    /// Handle keeping the backing library mapped, if any.
    pub fn library_handle(&self) -> Option<Arc<Library>> {
        self.library.clone()
    }
}

impl std::fmt::Debug for LoadedPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPackage")
            .field("path", &self.path)
            .field("exports", &self.exports.len())
            .field("dynamic", &self.library.is_some())
            .finish()
    }
}

/// Opens module packages.
///
/// Loading is blocking; the pipeline calls it from tokio's blocking pool.
pub trait PackageLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<LoadedPackage, LoaderError>;
}

fn load_failure(path: &Path, reason: impl Into<String>) -> LoaderError {
    LoaderError::LoadFailure {
        candidate: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn check_abi(path: &Path, declaration: &ModuleDeclaration) -> Result<(), LoaderError> {
    if declaration.abi_version != ABI_VERSION {
        return Err(load_failure(
            path,
            format!(
                "ABI mismatch: package built against {}, host expects {}",
                declaration.abi_version, ABI_VERSION
            ),
        ));
    }
    Ok(())
}

/// Loads native dynamic libraries exporting a `MODULE_DECLARATION` symbol.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl DylibLoader {
    pub fn new() -> Self {
        Self
    }
}

impl PackageLoader for DylibLoader {
    fn load(&self, path: &Path) -> Result<LoadedPackage, LoaderError> {
        debug!("Opening module library: {}", path.display());

        // Safety: loading runs the library's initializers. Module packages
        // are trusted code placed in the module directory by the operator.
        let library = unsafe {
            Library::new(path)
                .map_err(|e| load_failure(path, format!("Failed to load library: {}", e)))?
        };

        let exports = {
            // Safety: the symbol is a `ModuleDeclaration` static generated by
            // `export_modules!`; the pointer is only read while `library` is alive.
            let declaration: &ModuleDeclaration = unsafe {
                let symbol: Symbol<*const ModuleDeclaration> =
                    library.get(DECLARATION_SYMBOL).map_err(|e| {
                        load_failure(path, format!("Missing module declaration: {}", e))
                    })?;
                let pointer = *symbol;
                if pointer.is_null() {
                    return Err(load_failure(path, "Module declaration is a null pointer"));
                }
                &*pointer
            };

            check_abi(path, declaration)?;
            declaration.exports.to_vec()
        };

        Ok(LoadedPackage::dynamic(path, exports, library))
    }
}

/// Compile-time registry of module packages.
///
/// Maps candidate file names to export lists, for hosts that link their
/// modules statically or cannot load native libraries. Files without a
/// registered package fail to load like a corrupt library would.
#[derive(Debug, Default, Clone)]
pub struct StaticLoader {
    packages: HashMap<String, Vec<ModuleExport>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the exports served for candidates named `file_name`.
    pub fn with_package(mut self, file_name: impl Into<String>, exports: Vec<ModuleExport>) -> Self {
        self.packages.insert(file_name.into(), exports);
        self
    }

    /// Registers a declaration produced by `export_modules!` in a linked crate.
    pub fn with_declaration(
        self,
        file_name: impl Into<String>,
        declaration: &'static ModuleDeclaration,
    ) -> Result<Self, LoaderError> {
        let file_name = file_name.into();
        check_abi(Path::new(&file_name), declaration)?;
        Ok(self.with_package(file_name, declaration.exports.to_vec()))
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }
}

impl PackageLoader for StaticLoader {
    fn load(&self, path: &Path) -> Result<LoadedPackage, LoaderError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| load_failure(path, "Candidate has no file name"))?;

        self.packages
            .get(&file_name)
            .map(|exports| LoadedPackage::linked(path, exports.clone()))
            .ok_or_else(|| load_failure(path, "Not a registered module package"))
    }
}
