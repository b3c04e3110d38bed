use std::error::Error as StdError;

use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::AnalyzerConfig;
use crate::encoder::EncodedPart;
use crate::error::{AnalysisError, AnalysisResult};

const ERROR_BODY_MAX_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestPart {
    Image(EncodedPart),
    Text(String),
}

impl RequestPart {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Image(part) => part.to_inline_data(),
            Self::Text(text) => json!({ "text": text }),
        }
    }
}

/// One multimodal generation call: ordered content parts plus a JSON
/// output contract.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub parts: Vec<RequestPart>,
    pub response_mime_type: String,
    pub response_schema: Value,
}

impl GenerateRequest {
    /// Request body in the `generateContent` wire format.
    pub fn payload(&self) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": self.parts.iter().map(RequestPart::to_value).collect::<Vec<Value>>(),
            }],
            "generationConfig": {
                "responseMimeType": self.response_mime_type,
                "responseSchema": self.response_schema,
            },
        })
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, RequestPart::Image(_)))
            .count()
    }
}

/// The hosted model, reduced to the one capability the analyzer needs.
pub trait ModelClient: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerateRequest) -> AnalysisResult<String>;
}

pub struct GeminiClient {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: &AnalyzerConfig) -> AnalysisResult<Self> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|err| {
            AnalysisError::Configuration(format!(
                "failed to build HTTP client: {}",
                error_chain_text(&err)
            ))
        })?;
        Ok(Self {
            api_base: config.api_base.clone(),
            api_key: config.api_key().to_string(),
            http,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn extract_text(payload: &Value) -> AnalysisResult<String> {
        let candidates = payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let Some(candidate) = candidates.first() else {
            let reason = payload
                .get("promptFeedback")
                .and_then(|feedback| feedback.get("blockReason"))
                .and_then(Value::as_str)
                .unwrap_or("none given");
            return Err(AnalysisError::service(format!(
                "Gemini returned no candidates (block reason: {reason})"
            )));
        };

        let text: String = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            let reason = candidate
                .get("finishReason")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(AnalysisError::service(format!(
                "Gemini returned no text (finish reason: {reason})"
            )));
        }
        Ok(text)
    }
}

impl ModelClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &GenerateRequest) -> AnalysisResult<String> {
        let endpoint = self.endpoint_for_model(&request.model);
        debug!(
            endpoint = %endpoint,
            images = request.image_count(),
            "sending generateContent request"
        );
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request.payload())
            .send()
            .map_err(|err| {
                // The key travels in the query string; keep the URL out of messages.
                AnalysisError::service(format!(
                    "Gemini request failed: {}",
                    error_chain_text(&err.without_url())
                ))
            })?;
        let payload = response_json_or_error(response)?;
        Self::extract_text(&payload)
    }
}

fn response_json_or_error(response: HttpResponse) -> AnalysisResult<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| {
        AnalysisError::service(format!(
            "Gemini response body read failed: {}",
            error_chain_text(&err.without_url())
        ))
    })?;
    if !status.is_success() {
        return Err(AnalysisError::service(format!(
            "Gemini request failed ({code}): {}",
            upstream_error_message(&body)
        )));
    }
    serde_json::from_str(&body).map_err(|err| {
        AnalysisError::service(format!("Gemini returned invalid JSON payload: {err}"))
    })
}

/// Prefers the structured `error.message` of a Google API error body.
fn upstream_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|parsed| {
            parsed
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| truncate_text(body.trim(), ERROR_BODY_MAX_CHARS))
}

pub(crate) fn error_chain_text(err: &(dyn StdError + 'static)) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty()
            && !parts
                .last()
                .map(|existing| existing == trimmed)
                .unwrap_or(false)
        {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    parts.join(" | caused by: ")
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
