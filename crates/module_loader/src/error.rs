//! Error taxonomy for the activation engine.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Errors raised while discovering, activating or notifying.
///
/// Only [`LoaderError::SourceUnavailable`] ever escapes the activation
/// pipeline. The per-candidate variants are captured in the
/// [`ActivationReport`](crate::ActivationReport) and the listener variant is
/// logged during delivery.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// The module source itself could not be read. Aborts the run.
    #[error("Module source unavailable: {location}: {source}")]
    SourceUnavailable {
        location: String,
        #[source]
        source: std::io::Error,
    },
    /// A candidate package could not be loaded
    #[error("Failed to load {}: {reason}", candidate.display())]
    LoadFailure { candidate: PathBuf, reason: String },
    /// An exported type could not be constructed
    #[error("Failed to instantiate {type_name} from {}: {reason}", candidate.display())]
    InstantiationFailure {
        candidate: PathBuf,
        type_name: String,
        reason: String,
    },
    /// A module's init hook failed
    #[error("Module {module} from {} failed to initialize: {reason}", candidate.display())]
    InitFailure {
        candidate: PathBuf,
        module: String,
        reason: String,
    },
    /// A listener failed while an event was delivered
    #[error("Listener for {event} failed: {reason}")]
    ListenerFailure { event: String, reason: String },
    /// Event names must be non-empty
    #[error("Invalid event name: {0:?}")]
    InvalidEventName(String),
    /// Configuration is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LoaderError {
    /// Per-candidate classification, if this is a per-candidate error.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            LoaderError::LoadFailure { .. } => Some(FailureKind::LoadFailure),
            LoaderError::InstantiationFailure { .. } => Some(FailureKind::InstantiationFailure),
            LoaderError::InitFailure { .. } => Some(FailureKind::InitFailure),
            _ => None,
        }
    }
}

/// Kind of a recoverable per-candidate failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    LoadFailure,
    InstantiationFailure,
    InitFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::LoadFailure => "LoadFailure",
            FailureKind::InstantiationFailure => "InstantiationFailure",
            FailureKind::InitFailure => "InitFailure",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_classification() {
        let load = LoaderError::LoadFailure {
            candidate: PathBuf::from("bad.so"),
            reason: "not an ELF file".to_string(),
        };
        let listener = LoaderError::ListenerFailure {
            event: "plugin_loaded".to_string(),
            reason: "boom".to_string(),
        };

        assert_eq!(load.failure_kind(), Some(FailureKind::LoadFailure));
        assert_eq!(listener.failure_kind(), None);
        assert_eq!(load.to_string(), "Failed to load bad.so: not an ELF file");
    }
}
