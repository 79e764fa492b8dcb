//! Module package whose modules fail in different ways.
//!
//! `module_loader`'s native tests build this crate and load it next to
//! `echo_module` to check that failures inside a real library stay isolated.

use module_api::{export_modules, Module, ModuleError};

/// Loads cleanly.
pub struct Steady;

impl Steady {
    pub fn new() -> Self {
        Self
    }
}

impl Module for Steady {
    fn name(&self) -> &str {
        "Steady"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn on_load(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Panics in its init hook.
pub struct Volatile;

impl Volatile {
    pub fn new() -> Self {
        Self
    }
}

impl Module for Volatile {
    fn name(&self) -> &str {
        "Volatile"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn on_load(&mut self) -> Result<(), ModuleError> {
        panic!("volatile init hook")
    }
}

/// Panics when asked for its name.
pub struct Anonymous;

impl Anonymous {
    pub fn new() -> Self {
        Self
    }
}

impl Module for Anonymous {
    fn name(&self) -> &str {
        panic!("anonymous has no name")
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn on_load(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Panics while being constructed.
pub struct Stillborn;

impl Stillborn {
    pub fn new() -> Self {
        panic!("stillborn constructor")
    }
}

impl Module for Stillborn {
    fn name(&self) -> &str {
        "Stillborn"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn on_load(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }
}

export_modules!(Steady, Volatile, Anonymous, Stillborn);
