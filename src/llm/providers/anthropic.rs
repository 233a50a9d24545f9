use std::time::Duration;

use async_trait::async_trait;

use crate::config::ProviderEntry;
use crate::errors::OracleError;
use crate::llm::prompts;
use crate::llm::provider::{Oracle, OracleRequest};
use crate::llm::types::{ApiErrorBody, ContentBlock, ImageSource, Message, MessagesRequest, MessagesResponse};

/// Anthropic Messages API client. One POST per `consult`, no retries.
pub struct AnthropicProvider {
    id: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    anthropic_version: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(id: String, entry: &ProviderEntry, api_key: String) -> Self {
        Self {
            id,
            api_base: entry.api_base.clone(),
            model: entry.model.clone(),
            max_tokens: entry.max_tokens,
            anthropic_version: entry.anthropic_version.clone(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn build_body(&self, request: &OracleRequest) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![Message::user(vec![
                ContentBlock::Text {
                    text: prompts::render(&request.directive),
                },
                ContentBlock::Image {
                    source: ImageSource::base64(
                        request.snapshot.media_type.clone(),
                        request.snapshot.data.clone(),
                    ),
                },
            ])],
        }
    }
}

#[async_trait]
impl Oracle for AnthropicProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn consult(&self, request: &OracleRequest) -> Result<String, OracleError> {
        if self.api_key.trim().is_empty() {
            return Err(OracleError::AuthenticationMissing);
        }

        let body = self.build_body(request);
        tracing::debug!(
            provider = %self.id,
            model = %self.model,
            directive = request.directive.label(),
            timeout_secs = request.timeout.as_secs(),
            "sending oracle request"
        );
        tracing::debug!(
            body = %redacted_body(&body),
            "request body (sanitized, base64 omitted)"
        );

        let response = self
            .client
            .post(&self.api_base)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.anthropic_version)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e, request.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let err_body = response.text().await.unwrap_or_default();
            tracing::warn!(provider = %self.id, status = status.as_u16(), "oracle returned an error status");
            return Err(classify_status(status.as_u16(), &err_body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| match transport_error(&e, request.timeout) {
                OracleError::Timeout(secs) => OracleError::Timeout(secs),
                _ => OracleError::UpstreamError(format!("failed to parse oracle response: {e}")),
            })?;

        let text = parsed
            .text()
            .ok_or_else(|| OracleError::UpstreamError("unexpected response format: no text content".into()))?;
        tracing::info!(
            provider = %self.id,
            directive = request.directive.label(),
            reply_len = text.len(),
            stop_reason = parsed.stop_reason.as_deref().unwrap_or("unknown"),
            "oracle reply received"
        );
        Ok(text)
    }
}

/// Request body as JSON with every image payload replaced by a placeholder.
fn redacted_body(body: &MessagesRequest) -> String {
    let mut log_body = serde_json::to_value(body).unwrap_or_default();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            if let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) {
                for part in parts {
                    if let Some(data) = part.get_mut("source").and_then(|s| s.get_mut("data")) {
                        *data = serde_json::Value::String("<omitted_base64_image>".to_string());
                    }
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}

fn transport_error(e: &reqwest::Error, timeout: Duration) -> OracleError {
    if e.is_timeout() {
        OracleError::Timeout(timeout.as_secs())
    } else if e.is_connect() || e.is_request() {
        OracleError::NetworkError(e.to_string())
    } else {
        OracleError::UpstreamError(e.to_string())
    }
}

/// Maps a non-2xx reply onto the typed failure the user sees.
pub(crate) fn classify_status(status: u16, body: &str) -> OracleError {
    let (error_type, message) = match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => (parsed.error.error_type, parsed.error.message),
        Err(_) => (String::new(), body.trim().to_string()),
    };
    let message = if message.is_empty() {
        format!("HTTP error: {status}")
    } else {
        message
    };
    let lowered = message.to_ascii_lowercase();

    if status == 401 || error_type == "authentication_error" || lowered.contains("invalid_api_key") {
        OracleError::Unauthorized(message)
    } else if status == 429 || error_type == "rate_limit_error" || lowered.contains("quota") {
        OracleError::QuotaExceeded(message)
    } else {
        OracleError::UpstreamError(format!("{status}: {message}"))
    }
}
