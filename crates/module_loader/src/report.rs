//! Outcome of one activation run.

use crate::error::{FailureKind, LoaderError};
use serde::Serialize;
use std::path::PathBuf;

/// A single success or failure, tagged with the candidate it belongs to.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActivationOutcome {
    Success {
        candidate: PathBuf,
        name: String,
        version: String,
        type_name: String,
    },
    Failure {
        candidate: PathBuf,
        /// Exported type involved, if the package itself loaded
        type_name: Option<String>,
        kind: FailureKind,
        reason: String,
    },
}

impl ActivationOutcome {
    pub fn candidate(&self) -> &PathBuf {
        match self {
            ActivationOutcome::Success { candidate, .. } => candidate,
            ActivationOutcome::Failure { candidate, .. } => candidate,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActivationOutcome::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ActivationOutcome::Failure { kind, .. } => Some(*kind),
            ActivationOutcome::Success { .. } => None,
        }
    }

    /// Builds a failure entry from a per-candidate error.
    ///
    /// Returns `None` for errors that are not per-candidate.
    pub fn from_error(error: &LoaderError) -> Option<Self> {
        let kind = error.failure_kind()?;
        let (candidate, type_name, reason) = match error {
            LoaderError::LoadFailure { candidate, reason } => (candidate.clone(), None, reason.clone()),
            LoaderError::InstantiationFailure {
                candidate,
                type_name,
                reason,
            } => (candidate.clone(), Some(type_name.clone()), reason.clone()),
            LoaderError::InitFailure {
                candidate,
                module,
                reason,
            } => (candidate.clone(), Some(module.clone()), reason.clone()),
            _ => return None,
        };

        Some(ActivationOutcome::Failure {
            candidate,
            type_name,
            kind,
            reason,
        })
    }
}

/// Every success and failure of a run, in discovery order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivationReport {
    /// Location the candidates were discovered in
    pub source: String,
    /// Number of candidates discovered
    pub candidates: usize,
    pub outcomes: Vec<ActivationOutcome>,
}

impl ActivationReport {
    pub fn new(source: impl Into<String>, candidates: usize) -> Self {
        Self {
            source: source.into(),
            candidates,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: ActivationOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn successes(&self) -> impl Iterator<Item = &ActivationOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ActivationOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn failures_of(&self, kind: FailureKind) -> usize {
        self.failures()
            .filter(|outcome| outcome.failure_kind() == Some(kind))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Names of activated modules, in activation order.
    pub fn activated_names(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                ActivationOutcome::Success { name, .. } => Some(name.as_str()),
                ActivationOutcome::Failure { .. } => None,
            })
            .collect()
    }
}
