//! Font identification over a hosted multimodal model.
//!
//! The pipeline is encoder -> analyzer -> model client, driven either by a
//! one-shot call ([`analyze_font_images`]) or an [`AnalysisSession`].

pub mod analyzer;
pub mod client;
pub mod config;
pub mod encoder;
pub mod error;
pub mod session;

use fontfinder_contracts::analysis::FontAnalysisResult;
use fontfinder_contracts::assets::ImageAsset;

pub use analyzer::Analyzer;
pub use client::{GeminiClient, GenerateRequest, ModelClient, RequestPart};
pub use config::AnalyzerConfig;
pub use encoder::{encode, encode_all, EncodedPart};
pub use error::{AnalysisError, AnalysisResult};
pub use session::{
    AnalysisSession, PendingImage, PreviewHandle, PreviewRegistry, PreviewStore, SessionError,
    SessionOutcome,
};

/// Identifies the font shown in `images` with configuration read from the
/// process environment at call time.
pub fn analyze_font_images(images: &[ImageAsset]) -> AnalysisResult<FontAnalysisResult> {
    analyze_with_config(AnalyzerConfig::from_env, images)
}

fn analyze_with_config<F>(
    load_config: F,
    images: &[ImageAsset],
) -> AnalysisResult<FontAnalysisResult>
where
    F: FnOnce() -> AnalysisResult<AnalyzerConfig>,
{
    if images.is_empty() {
        return Err(AnalysisError::NoInput);
    }
    let config = load_config()?;
    Analyzer::gemini(config)?.analyze(images)
}
