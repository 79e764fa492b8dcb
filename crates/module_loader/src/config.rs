//! Loader configuration.

use crate::error::LoaderError;
use crate::events::PLUGIN_LOADED;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_module_directory() -> PathBuf {
    PathBuf::from("plugins")
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_extension() -> String {
    std::env::consts::DLL_EXTENSION.to_string()
}

fn default_startup_event() -> String {
    PLUGIN_LOADED.to_string()
}

/// Where modules live and how the loader announces itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Directory scanned for module packages
    #[serde(default = "default_module_directory")]
    pub module_directory: PathBuf,
    /// Directory reserved for log output
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    /// Package file extension, without the leading dot
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Event published once the loader has started
    #[serde(default = "default_startup_event")]
    pub startup_event: String,
    /// Per-package load timeout in milliseconds (unbounded when absent)
    #[serde(default)]
    pub load_timeout_ms: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            module_directory: default_module_directory(),
            log_directory: default_log_directory(),
            extension: default_extension(),
            startup_event: default_startup_event(),
            load_timeout_ms: None,
        }
    }
}

impl LoaderConfig {
    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(Duration::from_millis)
    }

    /// Checks the configuration for values the loader cannot work with.
    ///
    /// The startup event name is not checked here; the
    /// lifecycle controller skips the announcement when it is invalid.
    pub fn validate(&self) -> Result<(), LoaderError> {
        if self.module_directory.as_os_str().is_empty() {
            return Err(LoaderError::Config("module_directory must not be empty".to_string()));
        }
        if self.log_directory.as_os_str().is_empty() {
            return Err(LoaderError::Config("log_directory must not be empty".to_string()));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(LoaderError::Config("extension must not be empty".to_string()));
        }
        if self.load_timeout_ms == Some(0) {
            return Err(LoaderError::Config(
                "load_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LoaderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.module_directory, PathBuf::from("plugins"));
        assert_eq!(config.startup_event, "plugin_loaded");
        assert!(config.load_timeout().is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: LoaderConfig =
            toml::from_str("module_directory = \"mods\"\nload_timeout_ms = 1500\n").unwrap();
        assert_eq!(config.module_directory, PathBuf::from("mods"));
        assert_eq!(config.log_directory, PathBuf::from("logs"));
        assert_eq!(config.load_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_rejects_zero_timeout_and_empty_extension() {
        let mut config = LoaderConfig {
            load_timeout_ms: Some(0),
            ..LoaderConfig::default()
        };
        assert!(matches!(config.validate(), Err(LoaderError::Config(_))));

        config.load_timeout_ms = None;
        config.extension = ".".to_string();
        assert!(matches!(config.validate(), Err(LoaderError::Config(_))));
    }
}
