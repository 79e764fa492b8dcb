//! Sample module package.
//!
//! Build with `cargo build -p echo_module` and copy the resulting library
//! into the host's module directory to have `Echo` activated at startup.

use module_api::{export_modules, Module, ModuleError};

/// Repeats messages back, prefixed with its name once loaded.
pub struct EchoModule {
    prefix: Option<String>,
}

impl EchoModule {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn echo(&self, message: &str) -> Result<String, ModuleError> {
        match &self.prefix {
            Some(prefix) => Ok(format!("{}{}", prefix, message)),
            None => Err(ModuleError::InitFailed("Echo has not been loaded".to_string())),
        }
    }
}

impl Default for EchoModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for EchoModule {
    fn name(&self) -> &str {
        "Echo"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn on_load(&mut self) -> Result<(), ModuleError> {
        self.prefix = Some(format!("[{}] ", self.name()));
        Ok(())
    }
}

export_modules!(EchoModule);
