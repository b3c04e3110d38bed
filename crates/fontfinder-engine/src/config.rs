use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use fontfinder_contracts::models::DEFAULT_MODEL;

use crate::error::{AnalysisError, AnalysisResult};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Credential variables, checked in order.
pub const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];
pub const API_BASE_VAR: &str = "GEMINI_API_BASE";
pub const MODEL_VAR: &str = "FONTFINDER_MODEL";
pub const REQUEST_TIMEOUT_VAR: &str = "FONTFINDER_REQUEST_TIMEOUT";

/// Everything the analyzer needs to reach the model service. A value of this
/// type always carries a non-blank credential.
#[derive(Clone)]
pub struct AnalyzerConfig {
    api_key: String,
    pub api_base: String,
    pub model: String,
    pub request_timeout: Option<Duration>,
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl AnalyzerConfig {
    pub fn new(api_key: impl Into<String>) -> AnalysisResult<Self> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(AnalysisError::Configuration(format!(
                "API key is empty; set one of {}",
                API_KEY_VARS.join(", ")
            )));
        }
        Ok(Self {
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: None,
        })
    }

    pub fn from_env() -> AnalysisResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Process environment first, then the given `.env` file.
    pub fn from_env_with_dotenv(path: &Path) -> AnalysisResult<Self> {
        Self::from_layers(|key| env::var(key).ok(), &read_dotenv(path))
    }

    /// `primary` wins unless its value is blank; `fallback` fills the gaps.
    fn from_layers<F>(primary: F, fallback: &HashMap<String, String>) -> AnalysisResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup(|key| {
            primary(key)
                .filter(|value| !value.trim().is_empty())
                .or_else(|| fallback.get(key).cloned())
        })
    }

    pub fn from_lookup<F>(lookup: F) -> AnalysisResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let Some(api_key) = API_KEY_VARS.iter().find_map(|key| non_empty(*key)) else {
            return Err(AnalysisError::Configuration(format!(
                "API key not set; set one of {}",
                API_KEY_VARS.join(", ")
            )));
        };
        let mut config = Self::new(api_key)?;
        if let Some(api_base) = non_empty(API_BASE_VAR) {
            config = config.with_api_base(&api_base)?;
        }
        if let Some(model) = non_empty(MODEL_VAR) {
            config.model = model;
        }
        if let Some(raw) = non_empty(REQUEST_TIMEOUT_VAR) {
            config.request_timeout = Some(parse_timeout_seconds(&raw)?);
        }
        Ok(config)
    }

    pub fn with_api_base(mut self, api_base: &str) -> AnalysisResult<Self> {
        let trimmed = api_base.trim().trim_end_matches('/');
        reqwest::Url::parse(trimmed).map_err(|err| {
            AnalysisError::Configuration(format!("invalid {API_BASE_VAR} '{trimmed}': {err}"))
        })?;
        self.api_base = trimmed.to_string();
        Ok(self)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

fn parse_timeout_seconds(raw: &str) -> AnalysisResult<Duration> {
    let seconds: f64 = raw.parse().map_err(|_| {
        AnalysisError::Configuration(format!(
            "{REQUEST_TIMEOUT_VAR} must be a number of seconds, got '{raw}'"
        ))
    })?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(AnalysisError::Configuration(format!(
            "{REQUEST_TIMEOUT_VAR} must be positive, got '{raw}'"
        )));
    }
    Ok(Duration::from_secs_f64(seconds))
}

/// Reads `KEY=VALUE` lines. Missing or unreadable files yield an empty map;
/// later assignments override earlier ones.
pub fn read_dotenv(path: &Path) -> HashMap<String, String> {
    std::fs::read_to_string(path)
        .map(|content| content.lines().filter_map(parse_dotenv_line).collect())
        .unwrap_or_default()
}

fn parse_dotenv_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").map_or(line, str::trim_start);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key.to_string(), dotenv_value(value.trim())))
}

/// Quoted values are taken verbatim; unquoted ones lose a trailing ` # comment`.
fn dotenv_value(raw: &str) -> String {
    for quote in ['"', '\''] {
        if let Some(inner) = raw
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.to_string();
        }
    }
    raw.split_once(" #")
        .map_or(raw, |(value, _)| value.trim_end())
        .to_string()
}
