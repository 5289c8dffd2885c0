//! Campaign pipeline runner.
//!
//! A run walks the plan layer by layer. Before a stage is dispatched its
//! dependencies must have succeeded and its prompt must render; an advisory
//! stage with a failed dependency is recorded as failed instead of ending the
//! run. Stages of one layer then run concurrently. Succeeded outputs are merged into the run's
//! context under the stage id once the whole layer is done.

use super::plan::PipelinePlan;
use crate::cancellation::{CancellationToken, CleanupRegistry};
use crate::config::{AgentRole, CampaignConfig, ProductProfile, StageDefinition};
use crate::context::PipelineContext;
use crate::core::{FailurePolicy, RunState};
use crate::errors::CampaignError;
use crate::events::{types, EventSink, NoOpEventSink};
use crate::generation::{GenerationProvider, GenerationRequest};
use crate::report::{aggregate, CampaignReport, RunInfo};
use crate::stages::{FailureKind, StageExecutor, StageFailure, StageResult};
use crate::template;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifiers of one run.
#[derive(Debug, Clone)]
struct RunIds {
    run_id: String,
    session_id: String,
}

impl RunIds {
    fn generate() -> Self {
        Self {
            run_id: format!("campaign-{}", Uuid::new_v4()),
            session_id: format!("session-{}", Uuid::new_v4()),
        }
    }
}

/// Runs campaign pipelines against a generation provider.
///
/// The runner holds only immutable configuration, so one instance can serve
/// concurrent runs for different products; each run owns its context and
/// results.
pub struct CampaignRunner {
    config: Arc<CampaignConfig>,
    plan: Arc<PipelinePlan>,
    provider: Arc<dyn GenerationProvider>,
    executor: StageExecutor,
    sink: Arc<dyn EventSink>,
    max_concurrent_stages: usize,
}

impl CampaignRunner {
    /// Validates the configuration and builds the plan.
    ///
    /// # Errors
    ///
    /// Returns a configuration error (invalid tables, unknown or cyclic
    /// dependencies, unresolvable placeholders). No generation call is made.
    pub fn new(
        config: CampaignConfig,
        provider: Arc<dyn GenerationProvider>,
    ) -> Result<Self, CampaignError> {
        config.validate()?;
        let plan = PipelinePlan::build(&config.stages)?;
        let settings = &config.settings;

        let executor = StageExecutor::new(provider.clone())
            .with_retry(settings.retry.clone())
            .with_default_timeout(settings.stage_timeout());
        let max_concurrent_stages = settings.max_concurrent_stages.max(1);

        info!(
            stages = plan.len(),
            layers = plan.layers().len(),
            fingerprint = %plan.fingerprint(),
            "Campaign pipeline plan built"
        );

        Ok(Self {
            config: Arc::new(config),
            plan: Arc::new(plan),
            provider,
            executor,
            sink: Arc::new(NoOpEventSink),
            max_concurrent_stages,
        })
    }

    /// Sets the event sink for run lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.executor = self.executor.with_event_sink(sink.clone());
        self.sink = sink;
        self
    }

    /// Returns the validated plan.
    #[must_use]
    pub fn plan(&self) -> &PipelinePlan {
        &self.plan
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    /// Runs the pipeline for a product.
    ///
    /// # Errors
    ///
    /// Returns the first fatal cause: a configuration error, a failed
    /// critical stage (`StageFailed`), or `Cancelled`.
    pub async fn run_pipeline(&self, product: &ProductProfile) -> Result<CampaignReport, CampaignError> {
        self.run_with_cancellation(product, &CancellationToken::new())
            .await
    }

    /// Runs the pipeline for a catalog product key.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProduct` for a key not in the catalog, otherwise as
    /// [`run_pipeline`](Self::run_pipeline).
    pub async fn run_product(&self, product_key: &str) -> Result<CampaignReport, CampaignError> {
        let product = self.config.product(product_key)?.clone();
        self.run_pipeline(&product).await
    }

    /// Runs the pipeline on a private runtime and blocks until it finishes.
    ///
    /// # Errors
    ///
    /// As [`run_pipeline`](Self::run_pipeline), plus `Internal` when called
    /// from inside an async runtime or if the runtime cannot be created.
    pub fn run_pipeline_blocking(&self, product: &ProductProfile) -> Result<CampaignReport, CampaignError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(CampaignError::Internal(
                "run_pipeline_blocking called inside an async runtime; await run_pipeline instead"
                    .to_string(),
            ));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CampaignError::Internal(format!("failed to start runtime: {e}")))?;
        runtime.block_on(self.run_pipeline(product))
    }

    /// Runs the pipeline, aborting when `cancel` fires.
    ///
    /// Cancellation aborts in-flight generation calls and ends the run with
    /// `Cancelled`. Run-scoped cleanup runs whatever the outcome.
    ///
    /// # Errors
    ///
    /// As [`run_pipeline`](Self::run_pipeline).
    pub async fn run_with_cancellation(
        &self,
        product: &ProductProfile,
        cancel: &CancellationToken,
    ) -> Result<CampaignReport, CampaignError> {
        let ids = RunIds::generate();
        let span = info_span!("run", run_id = %ids.run_id, product = %product.id);

        async {
            let run_cancel = cancel.child_token();
            let cleanup = CleanupRegistry::new();
            {
                let provider = self.provider.clone();
                let session_id = ids.session_id.clone();
                cleanup.register("release_session", move || async move {
                    provider.release_session(&session_id).await;
                });
            }

            let outcome = self.execute(&ids, product, &run_cancel).await;

            for (name, message) in cleanup.run_all(CLEANUP_TIMEOUT).await {
                warn!(cleanup = %name, %message, "Run cleanup failed");
            }

            match &outcome {
                Ok(report) => {
                    info!(status = %report.status, "Campaign run finished");
                    self.sink
                        .emit(
                            types::RUN_COMPLETED,
                            Some(json!({
                                "run_id": ids.run_id,
                                "state": RunState::Completed,
                                "status": report.status,
                                "succeeded": report.summary.succeeded,
                                "failed": report.summary.failed,
                                "degraded_stages": report.summary.degraded_stages,
                            })),
                        )
                        .await;
                }
                Err(e) => {
                    error!(error = %e, "Campaign run failed");
                    self.sink
                        .emit(
                            types::RUN_FAILED,
                            Some(json!({
                                "run_id": ids.run_id,
                                "state": RunState::Failed,
                                "stage": e.stage(),
                                "error": e.to_string(),
                            })),
                        )
                        .await;
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        ids: &RunIds,
        product: &ProductProfile,
        cancel: &CancellationToken,
    ) -> Result<CampaignReport, CampaignError> {
        let plan = &self.plan;
        let started_at = Utc::now();
        let mut state = RunState::NotStarted;
        let mut context = PipelineContext::for_product(product);
        let mut results: Vec<Option<StageResult>> = vec![None; plan.len()];

        info!(stages = plan.len(), "Starting campaign run");
        self.sink
            .emit(
                types::RUN_STARTED,
                Some(json!({
                    "run_id": ids.run_id,
                    "session_id": ids.session_id,
                    "product": product.id,
                    "stages": plan.execution_order(),
                    "plan_fingerprint": plan.fingerprint(),
                })),
            )
            .await;

        for layer in plan.layers() {
            if cancel.is_cancelled() {
                state = state.fail();
                debug!(%state, "Run cancelled between layers");
                return Err(cancelled(cancel));
            }

            let mut dispatch = Vec::with_capacity(layer.len());
            for &index in layer {
                let stage = &plan.stages()[index];
                state = state.advance(index);
                debug!(%state, stage = %stage.id, "Dispatching stage");

                if let Err(e) = self.check_dependencies(stage, &results) {
                    if stage.policy == FailurePolicy::Advisory {
                        results[index] = Some(self.skip_stage(&ids.run_id, stage, &e).await);
                        continue;
                    }
                    state = state.fail();
                    debug!(%state, "Dependency check failed");
                    return Err(e);
                }
                let prompt = template::render(&stage.description, &context)
                    .map_err(|e| e.in_stage(&stage.id))?;
                dispatch.push((index, self.build_request(stage, &ids.session_id, prompt)));
            }

            let layer_cancel = cancel.child_token();
            let executed: Vec<(usize, StageResult)> = stream::iter(dispatch)
                .map(|(index, request)| {
                    let stage = &plan.stages()[index];
                    let layer_cancel = &layer_cancel;
                    async move {
                        let result = self.run_stage(&ids.run_id, stage, request, layer_cancel).await;
                        if !result.is_success() && stage.policy == FailurePolicy::Critical {
                            layer_cancel.cancel(format!("critical stage '{}' failed", stage.id));
                        }
                        (index, result)
                    }
                })
                .buffered(self.max_concurrent_stages)
                .collect()
                .await;

            for (index, result) in executed {
                if let Some(payload) = &result.payload {
                    context.set(result.stage_id.clone(), payload.to_context_value())?;
                }
                results[index] = Some(result);
            }

            if cancel.is_cancelled() {
                state = state.fail();
                debug!(%state, "Run cancelled during layer");
                return Err(cancelled(cancel));
            }
            if let Some(err) = first_critical_failure(layer, &results) {
                state = state.fail();
                debug!(%state, "Critical stage failed");
                return Err(err);
            }
        }

        state = state.complete();
        debug!(%state, "All stages finished");

        let results: Vec<StageResult> = results.into_iter().flatten().collect();
        Ok(aggregate(
            RunInfo {
                run_id: ids.run_id.clone(),
                product: product.clone(),
                plan_fingerprint: plan.fingerprint().to_string(),
                started_at,
            },
            results,
        ))
    }

    async fn run_stage(
        &self,
        run_id: &str,
        stage: &StageDefinition,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> StageResult {
        let span = info_span!("stage", stage = %stage.id);
        async {
            self.sink
                .emit(
                    types::STAGE_STARTED,
                    Some(json!({
                        "run_id": run_id,
                        "stage": stage.id,
                        "policy": stage.policy,
                        "expected_output": stage.expected_output,
                    })),
                )
                .await;

            let result = self.executor.execute(run_id, stage, request, cancel).await;

            match &result.failure {
                None => {
                    info!(attempts = result.attempts, duration_ms = result.duration_ms(), "Stage succeeded");
                    self.sink
                        .emit(
                            types::STAGE_COMPLETED,
                            Some(json!({
                                "run_id": run_id,
                                "stage": stage.id,
                                "attempts": result.attempts,
                                "duration_ms": result.duration_ms(),
                            })),
                        )
                        .await;
                }
                Some(failure) => {
                    if stage.policy == FailurePolicy::Advisory {
                        warn!(kind = %failure.kind, error = %failure.message, "Advisory stage failed, report will be degraded");
                    } else {
                        error!(kind = %failure.kind, error = %failure.message, "Critical stage failed");
                    }
                    self.sink
                        .emit(
                            types::STAGE_FAILED,
                            Some(json!({
                                "run_id": run_id,
                                "stage": stage.id,
                                "policy": stage.policy,
                                "kind": failure.kind,
                                "error": failure.message,
                                "attempts": result.attempts,
                            })),
                        )
                        .await;
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Records an advisory stage whose inputs are unavailable without calling
    /// the provider.
    async fn skip_stage(&self, run_id: &str, stage: &StageDefinition, cause: &CampaignError) -> StageResult {
        let failure = StageFailure::from_error(cause);
        warn!(stage = %stage.id, dependency = %failure.message, "Advisory stage skipped, report will be degraded");
        self.sink
            .emit(
                types::STAGE_FAILED,
                Some(json!({
                    "run_id": run_id,
                    "stage": stage.id,
                    "policy": stage.policy,
                    "kind": failure.kind,
                    "error": cause.to_string(),
                    "attempts": 0,
                })),
            )
            .await;
        StageResult::failed(stage.id.clone(), stage.policy, failure, 0, Utc::now())
    }

    fn check_dependencies(
        &self,
        stage: &StageDefinition,
        results: &[Option<StageResult>],
    ) -> Result<(), CampaignError> {
        for dep in &stage.depends_on {
            let satisfied = self
                .plan
                .position(dep)
                .and_then(|pos| results[pos].as_ref())
                .is_some_and(StageResult::is_success);
            if !satisfied {
                return Err(CampaignError::DependencyNotSatisfied {
                    stage: stage.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
        Ok(())
    }

    fn build_request(&self, stage: &StageDefinition, session_id: &str, prompt: String) -> GenerationRequest {
        let agent = stage.agent.as_deref().and_then(|id| self.config.agent(id));
        GenerationRequest::new(&stage.id, session_id, prompt, stage.expected_output)
            .with_instructions(agent.map(AgentRole::system_prompt).unwrap_or_default())
            .with_model(agent.and_then(|a| a.model.clone()))
    }
}

impl std::fmt::Debug for CampaignRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignRunner")
            .field("plan", &self.plan.execution_order())
            .field("max_concurrent_stages", &self.max_concurrent_stages)
            .finish_non_exhaustive()
    }
}

fn cancelled(cancel: &CancellationToken) -> CampaignError {
    CampaignError::Cancelled(cancel.reason().unwrap_or_else(|| "cancelled".to_string()))
}

/// The first failed critical stage of a layer, in plan order.
///
/// Siblings cancelled because of that failure are skipped so the real cause
/// is reported.
fn first_critical_failure(layer: &[usize], results: &[Option<StageResult>]) -> Option<CampaignError> {
    let critical: Vec<&StageResult> = layer
        .iter()
        .filter_map(|&i| results[i].as_ref())
        .filter(|r| !r.is_success() && r.policy == FailurePolicy::Critical)
        .collect();

    let cause = critical
        .iter()
        .find(|r| r.failure.as_ref().is_some_and(|f| f.kind != FailureKind::Cancelled))
        .or_else(|| critical.first())?;

    let source = cause
        .error()
        .unwrap_or_else(|| CampaignError::Internal("stage failed without detail".to_string()));
    Some(CampaignError::StageFailed {
        stage: cause.stage_id.clone(),
        source: Box::new(source),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::generation::MockGenerationProvider;
    use crate::testing::{fast_settings, research_strategy_qa_config, sample_product, ScriptedProvider};
    use pretty_assertions::assert_eq;

    fn runner(provider: Arc<ScriptedProvider>) -> CampaignRunner {
        CampaignRunner::new(research_strategy_qa_config(), provider).unwrap()
    }

    fn parallel_config() -> CampaignConfig {
        CampaignConfig::new(
            vec![sample_product()],
            Vec::new(),
            vec![
                StageDefinition::new("research", "Research {product_name}"),
                StageDefinition::new("audience", "Audience for {research}").with_dependencies(["research"]),
                StageDefinition::new("pricing", "Pricing for {research}").with_dependencies(["research"]),
                StageDefinition::new("report", "Combine {audience} and {pricing}")
                    .with_dependencies(["audience", "pricing"]),
            ],
        )
        .with_settings(fast_settings())
    }

    #[tokio::test]
    async fn test_outputs_threaded_into_later_prompts() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .respond("research", r#"{"summary": "secrets manager"}"#)
                .respond("strategy", r#"{"channels": ["email"]}"#)
                .respond("qa", r#"{"status": "pass"}"#),
        );

        let report = runner(provider.clone()).run_pipeline(&sample_product()).await.unwrap();

        assert_eq!(report.stage_ids(), vec!["research", "strategy", "qa"]);
        let strategy_prompt = provider.requests_for("strategy")[0].prompt().to_string();
        assert_eq!(
            strategy_prompt,
            r#"Plan a campaign for X using {"summary":"secrets manager"}"#
        );
        let research = &provider.requests_for("research")[0];
        assert_eq!(research.prompt(), "Research X: d");
        assert_eq!(research.instructions, "Role: Marketing Analyst\n\nBe precise.");
    }

    #[tokio::test]
    async fn test_session_shared_and_released() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .respond("research", "{}")
                .respond("strategy", "{}")
                .respond("qa", "{}"),
        );

        let report = runner(provider.clone()).run_pipeline(&sample_product()).await.unwrap();

        let sessions: Vec<String> = ["research", "strategy", "qa"]
            .iter()
            .map(|s| provider.requests_for(s)[0].session_id.clone())
            .collect();
        assert!(sessions.iter().all(|s| s == &sessions[0]));
        assert_eq!(provider.released_sessions(), vec![sessions[0].clone()]);
        assert!(report.run_id.starts_with("campaign-"));
    }

    #[tokio::test]
    async fn test_event_sequence() {
        let sink = Arc::new(CollectingEventSink::new());
        let provider = Arc::new(
            ScriptedProvider::new()
                .respond("research", "{}")
                .respond("strategy", "{}")
                .fail_permanent("qa", "content policy"),
        );

        runner(provider)
            .with_event_sink(sink.clone())
            .run_pipeline(&sample_product())
            .await
            .unwrap();

        assert_eq!(
            sink.event_types(),
            vec![
                "run.started",
                "stage.started",
                "stage.completed",
                "stage.started",
                "stage.completed",
                "stage.started",
                "stage.failed",
                "run.completed",
            ]
        );
        let (_, completed) = sink.events_of_type(types::RUN_COMPLETED).remove(0);
        assert_eq!(completed.unwrap()["status"], "degraded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_stages_run_concurrently() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .respond("research", "{}")
                .respond_after("audience", Duration::from_secs(2), "{}")
                .respond_after("pricing", Duration::from_secs(2), "{}")
                .respond("report", "{}"),
        );
        let runner = CampaignRunner::new(parallel_config(), provider.clone()).unwrap();

        let start = tokio::time::Instant::now();
        let report = runner.run_pipeline(&sample_product()).await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(4));
        assert_eq!(report.stage_ids(), vec!["research", "audience", "pricing", "report"]);
        assert_eq!(provider.call_count("report"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_failure_cancels_layer_siblings() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .respond("research", "{}")
                .respond_after("audience", Duration::from_secs(30), "{}")
                .fail_permanent("pricing", "invalid request"),
        );
        let runner = CampaignRunner::new(parallel_config(), provider.clone()).unwrap();

        let err = runner.run_pipeline(&sample_product()).await.unwrap_err();

        match err {
            CampaignError::StageFailed { stage, source } => {
                assert_eq!(stage, "pricing");
                assert!(matches!(*source, CampaignError::GenerationRejected { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.call_count("report"), 0);
    }

    #[tokio::test]
    async fn test_advisory_dependency_not_satisfied() {
        let mut config = research_strategy_qa_config();
        config.stages.push(
            StageDefinition::new("summary", "Summarise {qa}").with_dependencies(["qa"]),
        );
        let provider = Arc::new(
            ScriptedProvider::new()
                .respond("research", "{}")
                .respond("strategy", "{}")
                .fail_permanent("qa", "rejected"),
        );
        let runner = CampaignRunner::new(config, provider.clone()).unwrap();

        let err = runner.run_pipeline(&sample_product()).await.unwrap_err();

        assert!(matches!(
            err,
            CampaignError::DependencyNotSatisfied { ref stage, ref dependency }
                if stage == "summary" && dependency == "qa"
        ));
        assert_eq!(provider.call_count("summary"), 0);
    }

    #[tokio::test]
    async fn test_advisory_dependent_of_failed_stage_is_skipped() {
        let sink = Arc::new(CollectingEventSink::new());
        let mut config = research_strategy_qa_config();
        config.stages.push(
            StageDefinition::new("summary", "Summarise {qa}")
                .with_dependencies(["qa"])
                .advisory(),
        );
        let provider = Arc::new(
            ScriptedProvider::new()
                .respond("research", "{}")
                .respond("strategy", "{}")
                .fail_permanent("qa", "rejected"),
        );
        let runner = CampaignRunner::new(config, provider.clone())
            .unwrap()
            .with_event_sink(sink.clone());

        let report = runner.run_pipeline(&sample_product()).await.unwrap();

        assert!(report.is_degraded());
        assert_eq!(report.summary.degraded_stages, vec!["qa", "summary"]);
        let summary = report.stage("summary").unwrap();
        assert_eq!(summary.attempts, 0);
        let failure = summary.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::DependencyNotSatisfied);
        assert_eq!(failure.message, "qa");
        assert!(matches!(
            summary.error(),
            Some(CampaignError::DependencyNotSatisfied { ref stage, ref dependency })
                if stage == "summary" && dependency == "qa"
        ));
        assert_eq!(provider.call_count("summary"), 0);

        let failed = sink.events_of_type(types::STAGE_FAILED);
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[1].1.as_ref().unwrap()["kind"], "dependency_not_satisfied");
        assert_eq!(failed[1].1.as_ref().unwrap()["attempts"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_mid_run() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .respond("research", "{}")
                .respond_after("strategy", Duration::from_secs(60), "{}"),
        );
        let runner = runner(provider.clone());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel("operator abort");
        });

        let err = runner
            .run_with_cancellation(&sample_product(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, CampaignError::Cancelled(ref r) if r == "operator abort"));
        assert_eq!(provider.call_count("qa"), 0);
        assert_eq!(provider.released_sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_calls() {
        let mut mock = MockGenerationProvider::new();
        mock.expect_generate().never();
        mock.expect_release_session().times(1).returning(|_| ());
        let runner = CampaignRunner::new(research_strategy_qa_config(), Arc::new(mock)).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel("shutdown");
        let err = runner
            .run_with_cancellation(&sample_product(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, CampaignError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_run_product_lookup() {
        let provider = Arc::new(ScriptedProvider::new().respond_always("research", "{}"));
        let runner = runner(provider);

        let err = runner.run_product("nope").await.unwrap_err();
        assert!(matches!(err, CampaignError::UnknownProduct { .. }));
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_any_call() {
        let mut mock = MockGenerationProvider::new();
        mock.expect_generate().never();

        let mut config = research_strategy_qa_config();
        config.stages[0].depends_on = vec!["qa".to_string()];
        config.stages[0].description = "Research {qa}".to_string();

        let err = CampaignRunner::new(config, Arc::new(mock)).unwrap_err();
        assert!(matches!(err, CampaignError::CyclicDependency(_)));
    }

    #[test]
    fn test_blocking_entry_point() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .respond("research", "{}")
                .respond("strategy", "{}")
                .respond("qa", "{}"),
        );

        let report = runner(provider).run_pipeline_blocking(&sample_product()).unwrap();
        assert!(!report.is_degraded());
    }

    #[tokio::test]
    async fn test_blocking_entry_point_inside_runtime_is_rejected() {
        let provider = Arc::new(ScriptedProvider::new().respond_always("research", "{}"));

        let err = runner(provider.clone()).run_pipeline_blocking(&sample_product()).unwrap_err();

        assert!(matches!(err, CampaignError::Internal(ref msg) if msg.contains("async runtime")));
        assert_eq!(provider.call_count("research"), 0);
    }
}
