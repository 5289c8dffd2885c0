//! Stage status, output kind, failure policy and run state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of output a stage is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// A JSON document (object or array).
    #[default]
    Structured,
    /// Free text.
    Document,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured => write!(f, "structured"),
            Self::Document => write!(f, "document"),
        }
    }
}

/// How a stage failure affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Failure aborts the whole run.
    #[default]
    Critical,
    /// Failure is recorded and the run completes degraded.
    Advisory,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Advisory => write!(f, "advisory"),
        }
    }
}

/// The final status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage produced valid output.
    Succeeded,
    /// Stage failed.
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage_index")]
pub enum RunState {
    /// The run has not begun.
    #[default]
    NotStarted,
    /// The run is executing the stage at this plan index.
    Running(usize),
    /// Every critical stage succeeded.
    Completed,
    /// The run stopped on a fatal error.
    Failed,
}

impl RunState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Moves to `Running(index)`. Terminal states never transition again.
    #[must_use]
    pub fn advance(self, index: usize) -> Self {
        if self.is_terminal() {
            self
        } else {
            Self::Running(index)
        }
    }

    /// Moves to `Completed`, unless already terminal.
    #[must_use]
    pub fn complete(self) -> Self {
        if self.is_terminal() {
            self
        } else {
            Self::Completed
        }
    }

    /// Moves to `Failed`, unless already terminal.
    #[must_use]
    pub fn fail(self) -> Self {
        if self.is_terminal() {
            self
        } else {
            Self::Failed
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running(index) => write!(f, "running({index})"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
