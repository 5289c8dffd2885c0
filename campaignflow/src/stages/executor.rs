//! Stage executor: one stage's generation call with retry and validation.

use super::result::{FailureKind, StageFailure, StageResult};
use crate::cancellation::CancellationToken;
use crate::config::StageDefinition;
use crate::core::{OutputKind, StagePayload};
use crate::events::{types, EventSink, NoOpEventSink};
use crate::generation::{GenerationError, GenerationProvider, GenerationRequest, Message};
use crate::pipeline::retry::{should_retry, RetryConfig, RetryDecision, RetryState};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Follow-up sent once when structured output does not parse.
pub const CORRECTIVE_INSTRUCTION: &str = "Your previous response was not valid JSON. \
Reply again with only the JSON document, without commentary or code fences.";

enum CallOutcome {
    Response(String),
    Transient(String),
    Rejected(String),
    Cancelled(String),
}

/// Runs single stages against a generation provider.
///
/// The executor never touches the pipeline context; it only turns a rendered
/// request into a `StageResult`.
pub struct StageExecutor {
    provider: Arc<dyn GenerationProvider>,
    retry: RetryConfig,
    default_timeout: Duration,
    sink: Arc<dyn EventSink>,
}

impl StageExecutor {
    /// Creates an executor with the default retry policy and a 120s timeout.
    #[must_use]
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            provider,
            retry: RetryConfig::default(),
            default_timeout: Duration::from_secs(120),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the timeout used when a stage has no override.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the event sink for retry notifications.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Executes one stage.
    ///
    /// Transient failures and timeouts are retried per the retry policy.
    /// Malformed structured output gets one corrective follow-up, which has
    /// its own transient budget. Permanent rejections and cancellation end the
    /// stage immediately.
    pub async fn execute(
        &self,
        run_id: &str,
        stage: &StageDefinition,
        mut request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> StageResult {
        let started_at = Utc::now();
        let timeout = stage
            .timeout_seconds
            .map_or(self.default_timeout, Duration::from_secs);

        let mut state = RetryState::new();
        let mut calls = 0;
        let mut corrected = false;

        let fail = |kind, message: String, calls| {
            StageResult::failed(
                stage.id.clone(),
                stage.policy,
                StageFailure::new(kind, message),
                calls,
                started_at,
            )
        };

        loop {
            if cancel.is_cancelled() {
                return fail(FailureKind::Cancelled, cancel_reason(cancel), calls);
            }
            state.record_attempt();
            calls += 1;

            let (message, retryable) = match self.call(request.clone(), timeout, cancel).await {
                CallOutcome::Response(text) => match validate(stage.expected_output, &text) {
                    Ok(payload) => {
                        debug!(stage = %stage.id, calls, "Stage output accepted");
                        return StageResult::succeeded(
                            stage.id.clone(),
                            stage.policy,
                            payload,
                            calls,
                            started_at,
                        );
                    }
                    Err(reason) if stage.expected_output == OutputKind::Structured && !corrected => {
                        warn!(stage = %stage.id, %reason, "Malformed output, sending corrective follow-up");
                        corrected = true;
                        state = RetryState::new();
                        request.messages.push(Message::assistant(text));
                        request.messages.push(Message::user(CORRECTIVE_INSTRUCTION));
                        continue;
                    }
                    Err(reason) => return fail(FailureKind::MalformedOutput, reason, calls),
                },
                CallOutcome::Rejected(message) => (message, false),
                CallOutcome::Cancelled(reason) => return fail(FailureKind::Cancelled, reason, calls),
                CallOutcome::Transient(message) => (message, true),
            };

            match should_retry(&mut state, &self.retry, retryable) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        stage = %stage.id,
                        attempt = state.attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %message,
                        "Transient generation failure, retrying"
                    );
                    self.sink.try_emit(
                        types::STAGE_RETRYING,
                        Some(json!({
                            "run_id": run_id,
                            "stage": stage.id,
                            "attempt": state.attempts,
                            "delay_ms": u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "error": message,
                        })),
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            return fail(FailureKind::Cancelled, cancel_reason(cancel), calls);
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::NotRetryable => {
                    return fail(FailureKind::GenerationRejected, message, calls);
                }
                RetryDecision::GiveUp => {
                    return fail(FailureKind::GenerationUnavailable, message, calls);
                }
            }
        }
    }

    async fn call(
        &self,
        request: GenerationRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> CallOutcome {
        tokio::select! {
            biased;
            () = cancel.cancelled() => CallOutcome::Cancelled(cancel_reason(cancel)),
            result = tokio::time::timeout(timeout, self.provider.generate(request)) => match result {
                Ok(Ok(response)) => CallOutcome::Response(response.text),
                Ok(Err(GenerationError::Transient(m))) => CallOutcome::Transient(m),
                Ok(Err(GenerationError::Permanent(m))) => CallOutcome::Rejected(m),
                Err(_) => CallOutcome::Transient(format!("timed out after {}s", timeout.as_secs())),
            },
        }
    }
}

impl std::fmt::Debug for StageExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutor")
            .field("retry", &self.retry)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

fn cancel_reason(cancel: &CancellationToken) -> String {
    cancel.reason().unwrap_or_else(|| "cancelled".to_string())
}

/// Validates a raw reply against the expected output kind.
///
/// # Errors
///
/// Returns a description of why the reply is unusable.
pub fn validate(kind: OutputKind, text: &str) -> Result<StagePayload, String> {
    match kind {
        OutputKind::Structured => parse_structured(text).map(StagePayload::Structured),
        OutputKind::Document => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Err("empty document".to_string())
            } else {
                Ok(StagePayload::Document(trimmed.to_string()))
            }
        }
    }
}

/// Parses a structured reply into a JSON object or array.
///
/// A fenced ```` ```json ```` block wins; otherwise the outermost
/// `{...}` or `[...]` span of the reply is parsed.
///
/// # Errors
///
/// Returns the parse failure.
pub fn parse_structured(text: &str) -> Result<Value, String> {
    let candidate = extract_json(text).ok_or_else(|| "no JSON document found".to_string())?;
    let value: Value =
        serde_json::from_str(candidate).map_err(|e| format!("invalid JSON: {e}"))?;
    if value.is_object() || value.is_array() {
        Ok(value)
    } else {
        Err("JSON document is not an object or array".to_string())
    }
}

/// Finds the JSON text inside a model reply.
#[must_use]
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        let end = body.find("```").unwrap_or(body.len());
        return Some(body[..end].trim());
    }

    let start = text.find(|c| c == '{' || c == '[')?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::generation::{GenerationResponse, MockGenerationProvider};
    use crate::testing::ScriptedProvider;
    use pretty_assertions::assert_eq;

    fn structured_stage() -> StageDefinition {
        StageDefinition::new("research", "Research {product_name}")
    }

    fn request(stage: &StageDefinition) -> GenerationRequest {
        GenerationRequest::new(&stage.id, "session", "Research X", stage.expected_output)
    }

    async fn run(provider: Arc<dyn GenerationProvider>, stage: &StageDefinition) -> StageResult {
        StageExecutor::new(provider)
            .execute("run", stage, request(stage), &CancellationToken::new())
            .await
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(
            extract_json("Here you go:\n```json\n{\"a\": 1}\n```\nThanks"),
            Some("{\"a\": 1}")
        );
        assert_eq!(extract_json("Sure! {\"a\": {\"b\": 2}} done"), Some("{\"a\": {\"b\": 2}}"));
        assert_eq!(extract_json("list: [1, 2]"), Some("[1, 2]"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_validate_document() {
        assert_eq!(
            validate(OutputKind::Document, "  Report body \n").unwrap(),
            StagePayload::Document("Report body".to_string())
        );
        assert!(validate(OutputKind::Document, "   ").is_err());
    }

    #[test]
    fn test_validate_structured_rejects_scalars() {
        assert!(parse_structured("42").is_err());
        assert!(parse_structured("{\"a\": }").is_err());
        assert_eq!(parse_structured("{\"a\": 1}").unwrap(), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let stage = structured_stage();
        let provider = Arc::new(ScriptedProvider::new().respond("research", "{\"features\": [\"x\"]}"));

        let result = run(provider.clone(), &stage).await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 1);
        assert_eq!(
            result.payload,
            Some(StagePayload::Structured(json!({"features": ["x"]})))
        );
        assert_eq!(provider.call_count("research"), 1);
    }

    #[tokio::test]
    async fn test_corrective_follow_up_once() {
        let stage = structured_stage();
        let provider = Arc::new(
            ScriptedProvider::new()
                .respond("research", "I think the product is great")
                .respond("research", "{\"ok\": true}"),
        );

        let result = run(provider.clone(), &stage).await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 2);
        let calls = provider.requests_for("research");
        assert_eq!(calls[1].messages.len(), 3);
        assert_eq!(calls[1].messages[2].content, CORRECTIVE_INSTRUCTION);
    }

    #[tokio::test]
    async fn test_malformed_after_correction() {
        let stage = structured_stage();
        let provider = Arc::new(
            ScriptedProvider::new()
                .respond("research", "nope")
                .respond("research", "still nope")
                .respond("research", "{\"never\": \"reached\"}"),
        );

        let result = run(provider.clone(), &stage).await;

        assert_eq!(result.failure.as_ref().unwrap().kind, FailureKind::MalformedOutput);
        assert_eq!(provider.call_count("research"), 2);
    }

    #[tokio::test]
    async fn test_empty_document_is_malformed_without_follow_up() {
        let stage = StageDefinition::new("report", "Write").with_output(OutputKind::Document);
        let provider = Arc::new(ScriptedProvider::new().respond("report", "  "));

        let result = run(provider.clone(), &stage).await;

        assert_eq!(result.failure.unwrap().kind, FailureKind::MalformedOutput);
        assert_eq!(provider.call_count("report"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retried_with_backoff() {
        let stage = structured_stage();
        let sink = Arc::new(CollectingEventSink::new());
        let provider = Arc::new(
            ScriptedProvider::new()
                .fail_transient("research", "throttled")
                .fail_transient("research", "throttled")
                .respond("research", "{}"),
        );

        let start = tokio::time::Instant::now();
        let result = StageExecutor::new(provider.clone())
            .with_event_sink(sink.clone())
            .execute("run-1", &stage, request(&stage), &CancellationToken::new())
            .await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(3) && waited < Duration::from_secs(4));

        let retries = sink.events_of_type(types::STAGE_RETRYING);
        assert_eq!(retries.len(), 2);
        assert_eq!(retries[1].1.as_ref().unwrap()["delay_ms"], 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_exhaustion() {
        let stage = structured_stage();
        let provider = Arc::new(ScriptedProvider::new().fail_transient_always("research", "503"));

        let result = run(provider.clone(), &stage).await;

        let err = result.error().unwrap();
        assert!(matches!(
            err,
            crate::errors::CampaignError::GenerationUnavailable { attempts: 3, .. }
        ));
        assert_eq!(provider.call_count("research"), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let stage = structured_stage();
        let mut mock = MockGenerationProvider::new();
        mock.expect_generate()
            .times(1)
            .returning(|_| Err(GenerationError::Permanent("validation error".to_string())));

        let result = run(Arc::new(mock), &stage).await;

        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::GenerationRejected);
        assert_eq!(failure.message, "validation error");
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_after_retry_stops_immediately() {
        let stage = structured_stage();
        let sink = Arc::new(CollectingEventSink::new());
        let provider = Arc::new(
            ScriptedProvider::new()
                .fail_transient("research", "throttled")
                .fail_permanent("research", "content policy")
                .respond("research", "{\"never\": \"reached\"}"),
        );

        let result = StageExecutor::new(provider.clone())
            .with_event_sink(sink.clone())
            .execute("run-1", &stage, request(&stage), &CancellationToken::new())
            .await;

        let failure = result.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::GenerationRejected);
        assert_eq!(failure.message, "content policy");
        assert_eq!(result.attempts, 2);
        assert_eq!(provider.call_count("research"), 2);
        assert_eq!(sink.events_of_type(types::STAGE_RETRYING).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let stage = structured_stage().with_timeout_seconds(5);
        let provider = Arc::new(
            ScriptedProvider::new()
                .respond_after("research", Duration::from_secs(60), "{}")
                .respond("research", "{\"late\": false}"),
        );

        let result = run(provider, &stage).await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_in_flight_call() {
        let stage = structured_stage();
        let provider = Arc::new(
            ScriptedProvider::new().respond_after("research", Duration::from_secs(60), "{}"),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel("user abort");
        });

        let result = StageExecutor::new(provider)
            .execute("run", &stage, request(&stage), &cancel)
            .await;

        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Cancelled);
        assert_eq!(failure.message, "user abort");
    }

    #[tokio::test]
    async fn test_mock_sees_rendered_prompt() {
        let stage = structured_stage();
        let mut mock = MockGenerationProvider::new();
        mock.expect_generate()
            .withf(|req| req.prompt() == "Research X" && req.session_id == "session")
            .times(1)
            .returning(|_| Ok(GenerationResponse::text("```json\n[1]\n```")));

        let result = run(Arc::new(mock), &stage).await;
        assert_eq!(result.payload, Some(StagePayload::Structured(json!([1]))));
    }
}
