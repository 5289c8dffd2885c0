//! HTTP generation provider speaking the Bedrock Claude messages format.

use super::{GenerationError, GenerationProvider, GenerationRequest, GenerationResponse, Role};
use crate::config::GenerationSettings;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Posts requests to a Bedrock `invoke` endpoint (or anything compatible).
///
/// The endpoint defaults to the regional Bedrock runtime URL for the model;
/// `endpoint_url` in the settings overrides it. An optional bearer token is
/// read from `AWS_BEARER_TOKEN_BEDROCK`.
pub struct HttpGenerationProvider {
    client: Client,
    settings: GenerationSettings,
    bearer_token: Option<String>,
}

impl HttpGenerationProvider {
    /// Creates a provider for the given settings.
    #[must_use]
    pub fn new(settings: GenerationSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
            bearer_token: std::env::var("AWS_BEARER_TOKEN_BEDROCK").ok(),
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Returns the URL a request for `model` is posted to.
    #[must_use]
    pub fn endpoint_for(&self, model: &str) -> String {
        self.settings.endpoint_url.clone().unwrap_or_else(|| {
            format!(
                "https://bedrock-runtime.{}.amazonaws.com/model/{}/invoke",
                self.settings.region, model
            )
        })
    }

    /// Builds the request body.
    #[must_use]
    pub fn request_body(&self, request: &GenerationRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({"role": role, "content": m.content})
            })
            .collect();

        let mut body = json!({
            "anthropic_version": ANTHROPIC_VERSION,
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
            "messages": messages,
        });
        if !request.instructions.trim().is_empty() {
            body["system"] = json!(request.instructions);
        }
        body
    }
}

/// Maps an HTTP status to the transient/permanent split.
#[must_use]
pub(crate) fn classify_status(status: StatusCode, detail: String) -> GenerationError {
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        GenerationError::Transient(format!("HTTP {}: {detail}", status.as_u16()))
    } else {
        GenerationError::Permanent(format!("HTTP {}: {detail}", status.as_u16()))
    }
}

/// Request construction errors (bad URL, bad header) never heal on retry.
fn classify_send_error(error: &reqwest::Error) -> GenerationError {
    if error.is_builder() {
        GenerationError::Permanent(format!("invalid request: {error}"))
    } else {
        GenerationError::Transient(format!("request failed: {error}"))
    }
}

fn parse_body(body: &Value) -> GenerationResponse {
    let text = body["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"].as_str() == Some("text"))
                .filter_map(|b| b["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default();

    let tokens = |key: &str| {
        body["usage"][key]
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
    };

    GenerationResponse {
        text,
        model: body["model"].as_str().map(String::from),
        input_tokens: tokens("input_tokens"),
        output_tokens: tokens("output_tokens"),
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, GenerationError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.settings.model_id.clone());
        let url = self.endpoint_for(&model);
        let body = self.request_body(&request);

        debug!(
            stage = %request.stage_id,
            model = %model,
            messages = request.messages.len(),
            "Sending generation request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(&body);
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, detail));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Transient(format!("unreadable response body: {e}")))?;

        let mut parsed = parse_body(&json);
        if parsed.model.is_none() {
            parsed.model = Some(model);
        }
        Ok(parsed)
    }
}
