use thiserror::Error;

/// Everything an analysis call can fail with. All variants are terminal for
/// the call that produced them.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no images to analyze; add at least one image")]
    NoInput,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unsupported media type '{media_type}' for {file_name}")]
    UnsupportedMediaType {
        file_name: String,
        media_type: String,
    },

    #[error("model service error: {message}")]
    Service { message: String },

    #[error("malformed model response ({reason})")]
    MalformedResponse { reason: String, raw: String },

    #[error("unknown analysis error: {0}")]
    Unknown(String),
}

impl AnalysisError {
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Stable snake-case name used in event logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoInput => "no_input",
            Self::Configuration(_) => "configuration",
            Self::UnsupportedMediaType { .. } => "unsupported_media_type",
            Self::Service { .. } => "service",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Unknown(_) => "unknown",
        }
    }

    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::MalformedResponse { raw, .. } => Some(raw.as_str()),
            _ => None,
        }
    }
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::AnalysisError;

    #[test]
    fn display_messages_name_the_failure() {
        let unsupported = AnalysisError::UnsupportedMediaType {
            file_name: "scan.gif".to_string(),
            media_type: "image/gif".to_string(),
        };
        assert_eq!(
            unsupported.to_string(),
            "unsupported media type 'image/gif' for scan.gif"
        );
        assert_eq!(
            AnalysisError::service("HTTP 503").to_string(),
            "model service error: HTTP 503"
        );
        assert_eq!(AnalysisError::NoInput.kind(), "no_input");
    }

    #[test]
    fn malformed_keeps_raw_text() {
        let err = AnalysisError::malformed("expected value at line 1 column 1", "Sure! Here it is");
        assert_eq!(err.raw_response(), Some("Sure! Here it is"));
        assert_eq!(err.kind(), "malformed_response");
        assert!(AnalysisError::NoInput.raw_response().is_none());
    }
}
