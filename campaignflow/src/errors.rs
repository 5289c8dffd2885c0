//! Error types for campaign pipelines.
//!
//! Configuration problems (`MissingVariable`, `CyclicDependency`, plan
//! validation including reserved stage ids) are fatal and surface before any
//! generation call. `DependencyNotSatisfied` is fatal for a critical stage; an
//! advisory stage records it and the report is degraded. Generation problems
//! are retried by the stage executor and only surface once its budget is
//! spent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for campaign pipeline operations.
#[derive(Debug, Error)]
pub enum CampaignError {
    /// A template referenced a variable missing from the context.
    #[error("{0}")]
    MissingVariable(#[from] MissingVariableError),

    /// Structured output could not be parsed, even after a corrective retry.
    #[error("Malformed output from stage '{stage}': {message}")]
    MalformedOutput {
        /// The stage that produced the output.
        stage: String,
        /// Parse failure detail.
        message: String,
    },

    /// The generation capability stayed unavailable after all attempts.
    #[error("Generation unavailable for stage '{stage}' after {attempts} attempt(s): {message}")]
    GenerationUnavailable {
        /// The stage being generated.
        stage: String,
        /// Number of attempts made.
        attempts: usize,
        /// Last transient error.
        message: String,
    },

    /// The generation capability permanently rejected the request.
    #[error("Generation rejected for stage '{stage}': {message}")]
    GenerationRejected {
        /// The stage being generated.
        stage: String,
        /// Rejection detail.
        message: String,
    },

    /// A stage was reached while one of its dependencies had not succeeded.
    #[error("Stage '{stage}' cannot run: dependency '{dependency}' has not succeeded")]
    DependencyNotSatisfied {
        /// The stage that could not run.
        stage: String,
        /// The unsatisfied dependency.
        dependency: String,
    },

    /// The stage graph contains a cycle.
    #[error("{0}")]
    CyclicDependency(#[from] CycleDetectedError),

    /// The run was cancelled by the caller.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// A critical stage failed and aborted the run.
    #[error("Critical stage '{stage}' failed: {source}")]
    StageFailed {
        /// The failed stage.
        stage: String,
        /// The underlying failure.
        source: Box<CampaignError>,
    },

    /// The pipeline definition is malformed.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// Static configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A context key was written twice.
    #[error("{0}")]
    DataConflict(#[from] DataConflictError),

    /// The requested product is not in the catalog.
    #[error("Unknown product '{key}'; available products: {}", available.join(", "))]
    UnknownProduct {
        /// The requested key.
        key: String,
        /// Keys present in the catalog.
        available: Vec<String>,
    },

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CampaignError {
    /// Returns true for errors caused by a broken deployment rather than a
    /// runtime condition.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingVariable(_)
                | Self::DependencyNotSatisfied { .. }
                | Self::CyclicDependency(_)
                | Self::Validation(_)
                | Self::Config(_)
                | Self::DataConflict(_)
        )
    }

    /// Returns the stage that caused the error, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::MissingVariable(e) => e.stage.as_deref(),
            Self::MalformedOutput { stage, .. }
            | Self::GenerationUnavailable { stage, .. }
            | Self::GenerationRejected { stage, .. }
            | Self::DependencyNotSatisfied { stage, .. }
            | Self::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

/// Metadata about a configuration error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CAMPAIGN-001-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline definition fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected in the stage graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "CAMPAIGN-001-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

/// Error raised when writing to an existing key in a pipeline context.
#[derive(Debug, Clone, Error)]
#[error("Data conflict: key '{key}' already exists")]
pub struct DataConflictError {
    /// The conflicting key.
    pub key: String,
}

impl DataConflictError {
    /// Creates a new data conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Error raised when a template placeholder has no value in the context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Missing variable '{variable}'{}", stage.as_ref().map(|s| format!(" in stage '{s}'")).unwrap_or_default())]
pub struct MissingVariableError {
    /// The placeholder that could not be resolved.
    pub variable: String,
    /// The stage whose template referenced it, when known.
    pub stage: Option<String>,
}

impl MissingVariableError {
    /// Creates a new missing variable error.
    #[must_use]
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            stage: None,
        }
    }

    /// Attaches the stage whose template failed to render.
    #[must_use]
    pub fn in_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }
}

/// Errors raised while loading static configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// The file path.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// A configuration file could not be parsed.
    #[error("Failed to parse {name}: {source}")]
    Parse {
        /// The table or file name.
        name: String,
        /// The underlying YAML error.
        source: serde_yml::Error,
    },

    /// An environment override had an invalid value.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv {
        /// The environment variable.
        key: String,
        /// The rejected value.
        value: String,
    },

    /// A stage references an agent role that is not defined.
    #[error("Stage '{stage}' references unknown agent '{agent}'")]
    UnknownAgent {
        /// The stage id.
        stage: String,
        /// The missing agent id.
        agent: String,
    },

    /// A table contains an invalid entry.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
