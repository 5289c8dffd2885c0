//! Stage result types.

use crate::core::{FailurePolicy, StagePayload, StageStatus};
use crate::errors::CampaignError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Output could not be validated.
    MalformedOutput,
    /// Transient failures exhausted the retry budget.
    GenerationUnavailable,
    /// The request was permanently rejected.
    GenerationRejected,
    /// An upstream stage did not succeed. The message names it.
    DependencyNotSatisfied,
    /// The run was cancelled while the stage was in flight.
    Cancelled,
    /// Anything else.
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedOutput => write!(f, "malformed_output"),
            Self::GenerationUnavailable => write!(f, "generation_unavailable"),
            Self::GenerationRejected => write!(f, "generation_rejected"),
            Self::DependencyNotSatisfied => write!(f, "dependency_not_satisfied"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Why a stage failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub message: String,
}

impl StageFailure {
    /// Creates a new failure.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classifies an executor error.
    #[must_use]
    pub fn from_error(error: &CampaignError) -> Self {
        let (kind, message) = match error {
            CampaignError::MalformedOutput { message, .. } => {
                (FailureKind::MalformedOutput, message.clone())
            }
            CampaignError::GenerationUnavailable { message, .. } => {
                (FailureKind::GenerationUnavailable, message.clone())
            }
            CampaignError::GenerationRejected { message, .. } => {
                (FailureKind::GenerationRejected, message.clone())
            }
            CampaignError::DependencyNotSatisfied { dependency, .. } => {
                (FailureKind::DependencyNotSatisfied, dependency.clone())
            }
            CampaignError::Cancelled(reason) => (FailureKind::Cancelled, reason.clone()),
            other => (FailureKind::Internal, other.to_string()),
        };
        Self { kind, message }
    }
}

/// Outcome of one stage. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage id.
    pub stage_id: String,
    /// Outcome.
    pub status: StageStatus,
    /// Failure policy the stage ran under.
    pub policy: FailurePolicy,
    /// Output, when succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<StagePayload>,
    /// Failure detail, when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
    /// Generation calls made, including corrective follow-ups.
    pub attempts: usize,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage finished.
    pub finished_at: DateTime<Utc>,
}

impl StageResult {
    /// Creates a succeeded result finishing now.
    #[must_use]
    pub fn succeeded(
        stage_id: impl Into<String>,
        policy: FailurePolicy,
        payload: StagePayload,
        attempts: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage_id: stage_id.into(),
            status: StageStatus::Succeeded,
            policy,
            payload: Some(payload),
            failure: None,
            attempts,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Creates a failed result finishing now.
    #[must_use]
    pub fn failed(
        stage_id: impl Into<String>,
        policy: FailurePolicy,
        failure: StageFailure,
        attempts: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage_id: stage_id.into(),
            status: StageStatus::Failed,
            policy,
            payload: None,
            failure: Some(failure),
            attempts,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Succeeded
    }

    /// Returns true for a failed advisory stage.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.status == StageStatus::Failed && self.policy == FailurePolicy::Advisory
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Rebuilds the error that caused a failure.
    #[must_use]
    pub fn error(&self) -> Option<CampaignError> {
        let failure = self.failure.as_ref()?;
        let stage = self.stage_id.clone();
        let message = failure.message.clone();
        Some(match failure.kind {
            FailureKind::MalformedOutput => CampaignError::MalformedOutput { stage, message },
            FailureKind::GenerationUnavailable => CampaignError::GenerationUnavailable {
                stage,
                attempts: self.attempts,
                message,
            },
            FailureKind::GenerationRejected => CampaignError::GenerationRejected { stage, message },
            FailureKind::DependencyNotSatisfied => CampaignError::DependencyNotSatisfied {
                stage,
                dependency: message,
            },
            FailureKind::Cancelled => CampaignError::Cancelled(message),
            FailureKind::Internal => CampaignError::Internal(message),
        })
    }
}
