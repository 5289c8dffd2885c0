//! Campaign report aggregation and rendering.

use crate::config::ProductProfile;
use crate::stages::StageResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Characters of each stage output shown by [`CampaignReport::render_text`].
pub const PREVIEW_CHARS: usize = 500;

const RULE_WIDTH: usize = 80;

/// Overall status of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Every stage succeeded.
    Completed,
    /// The run completed, but one or more advisory stages failed.
    Degraded,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// Counts over a run's stage results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Stages recorded.
    pub total: usize,
    /// Stages that succeeded.
    pub succeeded: usize,
    /// Stages that failed.
    pub failed: usize,
    /// Failed advisory stages, in plan order.
    pub degraded_stages: Vec<String>,
    /// `succeeded / total`, or 0 for an empty run.
    pub success_rate: f64,
}

impl ReportSummary {
    /// Computes the summary for a list of results.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_results(results: &[StageResult]) -> Self {
        let total = results.len();
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let degraded_stages = results
            .iter()
            .filter(|r| r.is_degraded())
            .map(|r| r.stage_id.clone())
            .collect();

        Self {
            total,
            succeeded,
            failed: total - succeeded,
            degraded_stages,
            success_rate: if total == 0 {
                0.0
            } else {
                succeeded as f64 / total as f64
            },
        }
    }
}

/// Identity of the run a report belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    /// Run id, `campaign-<uuid>`.
    pub run_id: String,
    /// The product the campaign was generated for.
    pub product: ProductProfile,
    /// Fingerprint of the plan that ran.
    pub plan_fingerprint: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

/// Terminal artifact of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignReport {
    /// Run id.
    pub run_id: String,
    /// The product.
    pub product: ProductProfile,
    /// Completed or degraded.
    pub status: ReportStatus,
    /// Stage results in plan order.
    pub stages: Vec<StageResult>,
    /// Counts.
    pub summary: ReportSummary,
    /// Fingerprint of the plan that ran.
    pub plan_fingerprint: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the last stage finished.
    pub finished_at: DateTime<Utc>,
}

/// Merges stage results into a report.
///
/// Pure: the same inputs always give the same report.
#[must_use]
pub fn aggregate(run: RunInfo, results: Vec<StageResult>) -> CampaignReport {
    let summary = ReportSummary::from_results(&results);
    let status = if summary.failed == 0 {
        ReportStatus::Completed
    } else {
        ReportStatus::Degraded
    };
    let finished_at = results
        .iter()
        .map(|r| r.finished_at)
        .max()
        .unwrap_or(run.started_at);

    CampaignReport {
        run_id: run.run_id,
        product: run.product,
        status,
        stages: results,
        summary,
        plan_fingerprint: run.plan_fingerprint,
        started_at: run.started_at,
        finished_at,
    }
}

impl CampaignReport {
    /// Looks up a stage result.
    #[must_use]
    pub fn stage(&self, id: &str) -> Option<&StageResult> {
        self.stages.iter().find(|r| r.stage_id == id)
    }

    /// Returns the stage ids in report order.
    #[must_use]
    pub fn stage_ids(&self) -> Vec<&str> {
        self.stages.iter().map(|r| r.stage_id.as_str()).collect()
    }

    /// Returns true if any advisory stage failed.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.status == ReportStatus::Degraded
    }

    /// Renders a plain-text summary with a truncated preview per stage.
    #[must_use]
    pub fn render_text(&self) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = String::new();

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "MARKETING CAMPAIGN RESULTS");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Campaign ID: {}", self.run_id);
        let _ = writeln!(out, "Product: {}", self.product.name);
        let _ = writeln!(out, "Description: {}", self.product.description);
        let _ = writeln!(
            out,
            "Status: {} ({}/{} stages succeeded)",
            self.status, self.summary.succeeded, self.summary.total
        );
        if !self.summary.degraded_stages.is_empty() {
            let _ = writeln!(out, "Degraded: {}", self.summary.degraded_stages.join(", "));
        }
        let _ = writeln!(out, "{rule}");

        for result in &self.stages {
            let _ = writeln!(out, "\n{}:", result.stage_id.to_uppercase());
            let _ = writeln!(out, "{}", "-".repeat(40));
            let body = match (&result.payload, &result.failure) {
                (Some(payload), _) => preview(&payload.as_text(), PREVIEW_CHARS),
                (None, Some(failure)) => format!("FAILED ({}): {}", failure.kind, failure.message),
                (None, None) => String::new(),
            };
            let _ = writeln!(out, "{body}");
        }

        let _ = writeln!(out, "{rule}");
        out
    }
}

/// Truncates text to `max_chars` characters, appending `...` when cut.
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FailurePolicy, StagePayload};
    use crate::stages::{FailureKind, StageFailure};
    use crate::testing::sample_product;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run_info() -> RunInfo {
        RunInfo {
            run_id: "campaign-1".to_string(),
            product: sample_product(),
            plan_fingerprint: "abc".to_string(),
            started_at: Utc::now(),
        }
    }

    fn ok(id: &str) -> StageResult {
        StageResult::succeeded(
            id,
            FailurePolicy::Critical,
            StagePayload::Structured(json!({"stage": id})),
            1,
            Utc::now(),
        )
    }

    fn advisory_failure(id: &str) -> StageResult {
        StageResult::failed(
            id,
            FailurePolicy::Advisory,
            StageFailure::new(FailureKind::GenerationUnavailable, "throttled"),
            3,
            Utc::now(),
        )
    }

    #[test]
    fn test_all_succeeded() {
        let report = aggregate(run_info(), vec![ok("research"), ok("strategy")]);

        assert_eq!(report.status, ReportStatus::Completed);
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.failed, 0);
        assert!((report.summary.success_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(report.stage_ids(), vec!["research", "strategy"]);
    }

    #[test]
    fn test_advisory_failure_degrades() {
        let report = aggregate(
            run_info(),
            vec![ok("research"), ok("strategy"), advisory_failure("qa")],
        );

        assert!(report.is_degraded());
        assert_eq!(report.summary.degraded_stages, vec!["qa"]);
        assert_eq!(report.summary.succeeded, 2);
        assert!(!report.stage("qa").unwrap().is_success());
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let info = run_info();
        let results = vec![ok("research"), advisory_failure("qa")];

        let a = aggregate(info.clone(), results.clone());
        let b = aggregate(info, results);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_results() {
        let info = run_info();
        let report = aggregate(info.clone(), Vec::new());

        assert_eq!(report.summary.success_rate, 0.0);
        assert_eq!(report.finished_at, info.started_at);
    }

    #[test]
    fn test_preview_truncation() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("ééééé", 2), "éé...");
    }

    #[test]
    fn test_render_text() {
        let long = StageResult::succeeded(
            "final_report",
            FailurePolicy::Critical,
            StagePayload::Document("x".repeat(600)),
            1,
            Utc::now(),
        );
        let report = aggregate(run_info(), vec![long, advisory_failure("qa")]);
        let text = report.render_text();

        assert!(text.contains("Campaign ID: campaign-1"));
        assert!(text.contains("Status: degraded (1/2 stages succeeded)"));
        assert!(text.contains("FINAL_REPORT:"));
        assert!(text.contains(&format!("{}...", "x".repeat(500))));
        assert!(!text.contains(&"x".repeat(501)));
        assert!(text.contains("FAILED (generation_unavailable): throttled"));
    }
}
