use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use fontfinder_contracts::analysis::{AnalysisReport, FontAnalysisResult, MAX_STORE_LINKS};
use fontfinder_contracts::assets::ImageAsset;
use fontfinder_contracts::events::{
    redact_inline_data, EventPayload, EventWriter, ANALYSIS_FAILED, ANALYSIS_FINISHED,
    ANALYSIS_REQUEST, ANALYSIS_STARTED,
};
use fontfinder_contracts::prompt::{
    font_analysis_schema, FONT_ANALYSIS_INSTRUCTION, PROMPT_VERSION, RESPONSE_MIME_TYPE,
};
use serde_json::{json, Value};
use tracing::{debug, info, info_span, warn};

use crate::client::{GeminiClient, GenerateRequest, ModelClient, RequestPart};
use crate::config::AnalyzerConfig;
use crate::encoder::{encode_all, EncodedPart};
use crate::error::{AnalysisError, AnalysisResult};

/// Issues one model request per call and validates the answer.
pub struct Analyzer<C: ModelClient> {
    config: AnalyzerConfig,
    client: C,
    events: Option<EventWriter>,
}

impl Analyzer<GeminiClient> {
    pub fn gemini(config: AnalyzerConfig) -> AnalysisResult<Self> {
        let client = GeminiClient::new(&config)?;
        Ok(Self::new(config, client))
    }
}

impl<C: ModelClient> Analyzer<C> {
    pub fn new(config: AnalyzerConfig, client: C) -> Self {
        Self {
            config,
            client,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<EventWriter>) -> Self {
        self.events = events;
        self
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.config.model = model.into();
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn analyze(&self, images: &[ImageAsset]) -> AnalysisResult<FontAnalysisResult> {
        self.analyze_report(images).map(|report| report.result)
    }

    pub fn analyze_report(&self, images: &[ImageAsset]) -> AnalysisResult<AnalysisReport> {
        let span = info_span!(
            "font_analysis",
            model = %self.config.model,
            client = self.client.name(),
            images = images.len()
        );
        let _entered = span.enter();
        let started = Instant::now();

        let outcome = self.run(images);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok((result, warnings)) => {
                info!(font = %result.font_name, elapsed_ms, "font analysis finished");
                self.emit(
                    ANALYSIS_FINISHED,
                    json!({
                        "result": result,
                        "elapsed_ms": elapsed_ms,
                        "warnings": warnings,
                    }),
                );
                Ok(AnalysisReport {
                    result,
                    model: self.config.model.clone(),
                    prompt_version: PROMPT_VERSION.to_string(),
                    image_count: images.len(),
                    elapsed_ms,
                    warnings,
                })
            }
            Err(err) => {
                warn!(kind = err.kind(), error = %err, "font analysis failed");
                self.emit(
                    ANALYSIS_FAILED,
                    json!({
                        "error_kind": err.kind(),
                        "error": err.to_string(),
                        "raw_response": err.raw_response(),
                        "elapsed_ms": elapsed_ms,
                    }),
                );
                Err(err)
            }
        }
    }

    fn run(&self, images: &[ImageAsset]) -> AnalysisResult<(FontAnalysisResult, Vec<String>)> {
        if images.is_empty() {
            return Err(AnalysisError::NoInput);
        }
        self.emit(
            ANALYSIS_STARTED,
            json!({
                "model": self.config.model,
                "prompt_version": PROMPT_VERSION,
                "images": images.iter().map(image_summary).collect::<Vec<Value>>(),
            }),
        );

        let parts = encode_all(images)?;
        let request = build_request(&self.config.model, parts);
        if self.events.is_some() {
            self.emit(
                ANALYSIS_REQUEST,
                json!({
                    "model": request.model,
                    "payload": redact_inline_data(&request.payload()),
                }),
            );
        }

        let raw = panic::catch_unwind(AssertUnwindSafe(|| self.client.generate(&request)))
            .map_err(|_| {
                AnalysisError::Unknown(format!(
                    "model client '{}' panicked during generate",
                    self.client.name()
                ))
            })??;
        debug!(chars = raw.len(), "model response received");
        parse_response(&raw)
    }

    fn emit(&self, event_type: &str, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        let payload: EventPayload = payload.as_object().cloned().unwrap_or_default();
        if let Err(err) = events.emit(event_type, payload) {
            warn!(event = event_type, error = %err, "failed to write analysis event");
        }
    }
}

/// Image parts in upload order, followed by the instruction text.
pub fn build_request(model: &str, parts: Vec<EncodedPart>) -> GenerateRequest {
    let mut request_parts: Vec<RequestPart> = parts.into_iter().map(RequestPart::Image).collect();
    request_parts.push(RequestPart::Text(FONT_ANALYSIS_INSTRUCTION.to_string()));
    GenerateRequest {
        model: model.to_string(),
        parts: request_parts,
        response_mime_type: RESPONSE_MIME_TYPE.to_string(),
        response_schema: font_analysis_schema(),
    }
}

/// Validates model output. Only surrounding whitespace is tolerated; fenced
/// or chatty answers are rejected with the raw text attached.
pub fn parse_response(raw: &str) -> AnalysisResult<(FontAnalysisResult, Vec<String>)> {
    let mut result: FontAnalysisResult = serde_json::from_str(raw.trim())
        .map_err(|err| AnalysisError::malformed(err.to_string(), raw))?;
    if result.font_name.trim().is_empty() {
        return Err(AnalysisError::malformed("fontName is empty", raw));
    }

    let mut warnings = Vec::new();
    let total = result.store_links.len();
    if result.truncate_store_links(MAX_STORE_LINKS) > 0 {
        warnings.push(format!(
            "Model returned {total} store links; kept the first {MAX_STORE_LINKS}."
        ));
    }
    Ok((result, warnings))
}

fn image_summary(asset: &ImageAsset) -> Value {
    json!({
        "id": asset.id(),
        "file_name": asset.file_name(),
        "media_type": asset.media_type(),
        "bytes": asset.len(),
        "sha256": asset.sha256_hex(),
    })
}
