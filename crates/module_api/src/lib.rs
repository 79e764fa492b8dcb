//! Capability contract shared between the module host and module packages.
//!
//! A module package is a dynamic library that exports a single
//! [`ModuleDeclaration`] under the symbol named by [`DECLARATION_SYMBOL`].
//! The declaration lists every type the package exposes; the loader
//! instantiates the concrete ones and hands them to the registry.
//!
//! Package authors normally never write the declaration by hand:
//!
//! ```rust,ignore
//! use module_api::{export_modules, Module, ModuleError};
//!
//! pub struct Echo;
//!
//! impl Echo {
//!     pub fn new() -> Self { Self }
//! }
//!
//! impl Module for Echo {
//!     fn name(&self) -> &str { "Echo" }
//!     fn version(&self) -> &str { "1.0.0" }
//!     fn on_load(&mut self) -> Result<(), ModuleError> { Ok(()) }
//! }
//!
//! export_modules!(Echo);
//! ```

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// ABI tag embedded in every declaration.
///
/// The host refuses packages built against a different `module_api`, since
/// trait object layouts are only stable within one build of this crate.
pub const ABI_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Name of the exported static holding the [`ModuleDeclaration`].
pub const DECLARATION_SYMBOL: &[u8] = b"MODULE_DECLARATION\0";

/// The capability every activatable module implements.
///
/// # Lifecycle
///
/// 1. **Construction**: the type's no-argument constructor runs
/// 2. **Load**: `on_load()` is called exactly once, right after construction
/// 3. **Operation**: the instance lives in the host registry until shutdown
///
/// There is no teardown hook; instances are dropped with the registry.
pub trait Module: Send + Sync {
    /// Human-readable module name. Used as the registry key.
    fn name(&self) -> &str;

    /// Informational version string.
    fn version(&self) -> &str;

    /// Initialization hook. A module that fails here is never registered.
    fn on_load(&mut self) -> Result<(), ModuleError>;
}

/// Errors raised by module code.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// The init hook rejected startup
    #[error("Module initialization failed: {0}")]
    InitFailed(String),
    /// The constructor could not build an instance
    #[error("Module construction failed: {0}")]
    ConstructionFailed(String),
    /// Module code panicked
    #[error("Module panicked: {0}")]
    Panicked(String),
}

/// No-argument constructor for an exported module type.
pub type ModuleConstructor = fn() -> Result<Box<dyn Module>, ModuleError>;

/// How an exported type relates to the [`Module`] capability.
#[derive(Debug, Clone, Copy)]
pub enum ExportKind {
    /// A concrete type that can be instantiated and activated.
    Concrete(ModuleConstructor),
    /// An interface-only or marker declaration. Never instantiated.
    Abstract,
}

/// One type exported by a module package.
#[derive(Debug, Clone, Copy)]
pub struct ModuleExport {
    /// Rust type name as written at the export site
    pub type_name: &'static str,
    pub kind: ExportKind,
}

impl ModuleExport {
    pub const fn concrete(type_name: &'static str, constructor: ModuleConstructor) -> Self {
        Self {
            type_name,
            kind: ExportKind::Concrete(constructor),
        }
    }

    pub const fn abstract_type(type_name: &'static str) -> Self {
        Self {
            type_name,
            kind: ExportKind::Abstract,
        }
    }

    /// Returns the constructor for concrete exports.
    pub fn constructor(&self) -> Option<ModuleConstructor> {
        match self.kind {
            ExportKind::Concrete(constructor) => Some(constructor),
            ExportKind::Abstract => None,
        }
    }

    pub fn is_activatable(&self) -> bool {
        matches!(self.kind, ExportKind::Concrete(_))
    }
}

/// The table a module package exports under [`DECLARATION_SYMBOL`].
#[derive(Debug)]
pub struct ModuleDeclaration {
    /// Must equal the host's [`ABI_VERSION`]
    pub abi_version: &'static str,
    pub exports: &'static [ModuleExport],
}

/// Runs a module constructor, converting a panic into [`ModuleError::Panicked`].
///
/// The instance is returned inside a [`GuardedModule`]. Unwinding across the
/// package boundary aborts the host, so every constructor generated by
/// [`export_modules!`] goes through here and every later call into the
/// module is guarded on the package side as well.
pub fn construct_guarded<T, F>(constructor: F) -> Result<Box<dyn Module>, ModuleError>
where
    T: Module + 'static,
    F: FnOnce() -> T,
{
    catch_unwind(AssertUnwindSafe(constructor))
        .map(|module| Box::new(GuardedModule::new(module)) as Box<dyn Module>)
        .map_err(|payload| ModuleError::Panicked(panic_message(payload.as_ref())))
}

/// Version reported when a module's `version()` panics.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Wraps a module so that none of its methods unwind into the caller.
///
/// Name and version are read once at construction. A panicking `name()`
/// yields an empty name, which the host rejects. A panicking `on_load()`
/// becomes [`ModuleError::Panicked`].
pub struct GuardedModule<T> {
    inner: T,
    name: String,
    version: String,
}

impl<T: Module> GuardedModule<T> {
    pub fn new(inner: T) -> Self {
        let name = catch_unwind(AssertUnwindSafe(|| inner.name().to_string())).unwrap_or_default();
        let version = catch_unwind(AssertUnwindSafe(|| inner.version().to_string()))
            .unwrap_or_else(|_| UNKNOWN_VERSION.to_string());
        Self {
            inner,
            name,
            version,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Module> Module for GuardedModule<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn on_load(&mut self) -> Result<(), ModuleError> {
        let inner = &mut self.inner;
        catch_unwind(AssertUnwindSafe(|| inner.on_load()))
            .unwrap_or_else(|payload| Err(ModuleError::Panicked(panic_message(payload.as_ref()))))
    }
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Exports a [`ModuleDeclaration`] for the listed module types.
///
/// Every listed type needs a `fn new() -> Self` constructor. Names after
/// `abstract` are declared as interface-only exports and are never
/// instantiated by the host.
///
/// ```rust,ignore
/// export_modules!(EchoModule, StatsModule; abstract Greeter);
/// ```
#[macro_export]
macro_rules! export_modules {
    ($($module_type:ty),+ $(,)? $(; abstract $($abstract_name:ident),+ $(,)?)?) => {
        #[no_mangle]
        pub static MODULE_DECLARATION: $crate::ModuleDeclaration = $crate::ModuleDeclaration {
            abi_version: $crate::ABI_VERSION,
            exports: &[
                $(
                    $crate::ModuleExport::concrete(stringify!($module_type), {
                        fn construct() -> ::std::result::Result<
                            ::std::boxed::Box<dyn $crate::Module>,
                            $crate::ModuleError,
                        > {
                            $crate::construct_guarded(|| <$module_type>::new())
                        }
                        construct
                    }),
                )+
                $($(
                    $crate::ModuleExport::abstract_type(stringify!($abstract_name)),
                )+)?
            ],
        };
    };
}
