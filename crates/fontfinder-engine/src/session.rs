use std::collections::BTreeSet;

use fontfinder_contracts::analysis::AnalysisReport;
use fontfinder_contracts::assets::ImageAsset;
use fontfinder_contracts::events::{EventPayload, EventWriter, SESSION_IMAGES_CHANGED};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::analyzer::Analyzer;
use crate::client::ModelClient;
use crate::error::AnalysisError;

pub const EMPTY_SESSION_MESSAGE: &str = "Please upload at least one image to analyze.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PreviewHandle(pub u64);

/// Owner of display resources tied to pending images. Every handle returned
/// by `create` is released at most once by the session.
pub trait PreviewStore {
    fn create(&mut self, asset: &ImageAsset) -> PreviewHandle;
    fn release(&mut self, handle: PreviewHandle);
}

/// In-memory preview store that only tracks handle lifetimes.
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    next: u64,
    live: BTreeSet<PreviewHandle>,
    released: usize,
    double_releases: usize,
}

impl PreviewRegistry {
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn release_count(&self) -> usize {
        self.released
    }

    pub fn double_release_count(&self) -> usize {
        self.double_releases
    }

    pub fn is_live(&self, handle: PreviewHandle) -> bool {
        self.live.contains(&handle)
    }
}

impl PreviewStore for PreviewRegistry {
    fn create(&mut self, _asset: &ImageAsset) -> PreviewHandle {
        self.next += 1;
        let handle = PreviewHandle(self.next);
        self.live.insert(handle);
        handle
    }

    fn release(&mut self, handle: PreviewHandle) {
        if self.live.remove(&handle) {
            self.released += 1;
        } else {
            warn!(handle = handle.0, "preview released twice");
            self.double_releases += 1;
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingImage {
    pub asset: ImageAsset,
    pub preview: PreviewHandle,
}

/// Last analysis outcome; a session never holds a result and an error at once.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Result(AnalysisReport),
    Error {
        message: String,
        /// Model text that failed validation, kept for display.
        raw_response: Option<String>,
    },
}

impl SessionOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            raw_response: None,
        }
    }

    pub fn from_analysis_error(err: &AnalysisError) -> Self {
        Self::Error {
            message: err.to_string(),
            raw_response: err.raw_response().map(str::to_string),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("an analysis is already in progress")]
    InFlight,
    #[error("{}", EMPTY_SESSION_MESSAGE)]
    Empty,
}

/// Pending image set plus the single in-flight analysis slot.
pub struct AnalysisSession<P: PreviewStore> {
    images: Vec<PendingImage>,
    previews: P,
    in_flight: bool,
    outcome: Option<SessionOutcome>,
    events: Option<EventWriter>,
}

impl<P: PreviewStore> AnalysisSession<P> {
    pub fn new(previews: P) -> Self {
        Self {
            images: Vec::new(),
            previews,
            in_flight: false,
            outcome: None,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<EventWriter>) -> Self {
        self.events = events;
        self
    }

    pub fn images(&self) -> &[PendingImage] {
        &self.images
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn previews(&self) -> &P {
        &self.previews
    }

    /// Accepts `image/*` assets and returns the ones that were skipped.
    pub fn add_assets(&mut self, assets: Vec<ImageAsset>) -> Result<Vec<ImageAsset>, SessionError> {
        if self.in_flight {
            return Err(SessionError::InFlight);
        }
        let mut skipped = Vec::new();
        let mut added = 0usize;
        for asset in assets {
            if !asset.is_image() {
                debug!(
                    file = asset.file_name(),
                    media_type = asset.media_type(),
                    "skipping non-image file"
                );
                skipped.push(asset);
                continue;
            }
            let preview = self.previews.create(&asset);
            self.images.push(PendingImage { asset, preview });
            added += 1;
        }
        if added > 0 {
            self.outcome = None;
            self.emit_images_changed("add");
        }
        Ok(skipped)
    }

    pub fn remove(&mut self, id: &str) -> Result<bool, SessionError> {
        if self.in_flight {
            return Err(SessionError::InFlight);
        }
        let Some(index) = self.images.iter().position(|row| row.asset.id() == id) else {
            return Ok(false);
        };
        let removed = self.images.remove(index);
        self.previews.release(removed.preview);
        self.emit_images_changed("remove");
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<usize, SessionError> {
        if self.in_flight {
            return Err(SessionError::InFlight);
        }
        let removed = self.images.len();
        for row in self.images.drain(..) {
            self.previews.release(row.preview);
        }
        if removed > 0 {
            self.emit_images_changed("clear");
        }
        Ok(removed)
    }

    /// Resolves an image by full id, 1-based position, or unique id prefix.
    /// Numeric tokens are always positions.
    pub fn find_id(&self, token: &str) -> Option<String> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        if let Some(row) = self.images.iter().find(|row| row.asset.id() == token) {
            return Some(row.asset.id().to_string());
        }
        if let Ok(position) = token.parse::<usize>() {
            return position
                .checked_sub(1)
                .and_then(|idx| self.images.get(idx))
                .map(|row| row.asset.id().to_string());
        }
        let mut prefixed = self
            .images
            .iter()
            .filter(|row| row.asset.id().starts_with(token));
        match (prefixed.next(), prefixed.next()) {
            (Some(row), None) => Some(row.asset.id().to_string()),
            _ => None,
        }
    }

    /// Marks the session in flight and returns the assets to submit, in
    /// upload order.
    pub fn begin_analysis(&mut self) -> Result<Vec<ImageAsset>, SessionError> {
        if self.in_flight {
            return Err(SessionError::InFlight);
        }
        if self.images.is_empty() {
            self.outcome = Some(SessionOutcome::error(EMPTY_SESSION_MESSAGE));
            return Err(SessionError::Empty);
        }
        self.in_flight = true;
        self.outcome = None;
        Ok(self.images.iter().map(|row| row.asset.clone()).collect())
    }

    pub fn finish_analysis(&mut self, outcome: SessionOutcome) {
        self.in_flight = false;
        self.outcome = Some(outcome);
    }

    /// Runs one analysis over the pending images. Images stay pending
    /// afterwards so the user can refine the set and retry.
    pub fn analyze_with<C: ModelClient>(
        &mut self,
        analyzer: &Analyzer<C>,
    ) -> Result<&SessionOutcome, SessionError> {
        let assets = self.begin_analysis()?;
        let outcome = match analyzer.analyze_report(&assets) {
            Ok(report) => SessionOutcome::Result(report),
            Err(err) => SessionOutcome::from_analysis_error(&err),
        };
        self.in_flight = false;
        Ok(self.outcome.insert(outcome))
    }

    fn emit_images_changed(&self, reason: &str) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        let mut payload = EventPayload::new();
        payload.insert("reason".to_string(), json!(reason));
        payload.insert(
            "images".to_string(),
            Value::Array(
                self.images
                    .iter()
                    .map(|row| json!({"id": row.asset.id(), "file_name": row.asset.file_name()}))
                    .collect(),
            ),
        );
        if let Err(err) = events.emit(SESSION_IMAGES_CHANGED, payload) {
            warn!(error = %err, "failed to write session event");
        }
    }
}

impl<P: PreviewStore> Drop for AnalysisSession<P> {
    fn drop(&mut self) {
        for row in self.images.drain(..) {
            self.previews.release(row.preview);
        }
    }
}

#[cfg(test)]
mod tests {
    use fontfinder_contracts::assets::ImageAsset;

    use super::{
        AnalysisSession, PreviewHandle, PreviewRegistry, PreviewStore, SessionError,
        SessionOutcome, EMPTY_SESSION_MESSAGE,
    };
    use crate::analyzer::tests::{analyzer_with, png, RecordingClient, VALID_RESPONSE};

    fn session_with(names: &[&str]) -> AnalysisSession<PreviewRegistry> {
        let mut session = AnalysisSession::new(PreviewRegistry::default());
        let skipped = session
            .add_assets(names.iter().map(|name| png(name)).collect())
            .expect("session idle");
        assert!(skipped.is_empty());
        session
    }

    #[test]
    fn non_image_files_are_skipped() -> anyhow::Result<()> {
        let mut session = AnalysisSession::new(PreviewRegistry::default());
        let skipped = session.add_assets(vec![
            png("a.png"),
            ImageAsset::new("notes.txt", "text/plain", b"hello".to_vec()),
        ])?;
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].file_name(), "notes.txt");
        assert_eq!(session.images().len(), 1);
        assert_eq!(session.previews().live_count(), 1);
        Ok(())
    }

    #[test]
    fn removal_releases_preview_exactly_once() -> anyhow::Result<()> {
        let mut session = session_with(&["a.png", "b.png"]);
        let first = session.images()[0].clone();

        assert!(session.remove(first.asset.id())?);
        assert!(!session.remove(first.asset.id())?);
        assert!(!session.remove("missing")?);

        assert_eq!(session.images().len(), 1);
        assert!(session
            .images()
            .iter()
            .all(|row| row.asset.id() != first.asset.id()));
        assert!(!session.previews().is_live(first.preview));
        assert_eq!(session.previews().release_count(), 1);
        assert_eq!(session.previews().double_release_count(), 0);
        Ok(())
    }

    #[test]
    fn removed_image_is_not_submitted() -> anyhow::Result<()> {
        let mut session = session_with(&["a.png", "b.png", "c.png"]);
        let removed = session.images()[1].asset.id().to_string();
        session.remove(&removed)?;

        let assets = session.begin_analysis()?;
        assert_eq!(assets.len(), 2);
        assert!(assets.iter().all(|asset| asset.id() != removed));
        assert_eq!(assets[0].file_name(), "a.png");
        assert_eq!(assets[1].file_name(), "c.png");
        Ok(())
    }

    #[test]
    fn clear_releases_every_preview() -> anyhow::Result<()> {
        let mut session = session_with(&["a.png", "b.png", "c.png"]);
        assert_eq!(session.clear()?, 3);
        assert!(session.images().is_empty());
        assert_eq!(session.previews().live_count(), 0);
        assert_eq!(session.previews().release_count(), 3);
        assert_eq!(session.clear()?, 0);
        Ok(())
    }

    #[test]
    fn empty_session_refuses_analysis_with_message() {
        let mut session = AnalysisSession::new(PreviewRegistry::default());
        assert_eq!(session.begin_analysis(), Err(SessionError::Empty));
        assert_eq!(
            session.outcome(),
            Some(&SessionOutcome::error(EMPTY_SESSION_MESSAGE))
        );
        assert!(!session.is_in_flight());
    }

    #[test]
    fn second_submission_while_in_flight_is_refused() -> anyhow::Result<()> {
        let mut session = session_with(&["a.png"]);
        session.begin_analysis()?;
        assert!(session.is_in_flight());
        assert_eq!(session.begin_analysis(), Err(SessionError::InFlight));
        assert_eq!(session.add_assets(vec![png("b.png")]), Err(SessionError::InFlight));
        assert_eq!(session.clear(), Err(SessionError::InFlight));

        session.finish_analysis(SessionOutcome::error("boom"));
        assert!(!session.is_in_flight());
        Ok(())
    }

    #[test]
    fn find_id_accepts_full_id_prefix_and_position() {
        let session = session_with(&["a.png", "b.png"]);
        let second = session.images()[1].asset.id().to_string();
        assert_eq!(session.find_id(&second), Some(second.clone()));
        assert_eq!(session.find_id(&second[..12]), Some(second.clone()));
        assert_eq!(session.find_id("2"), Some(second));
        assert_eq!(session.find_id("3"), None);
        assert_eq!(session.find_id("0"), None);
        assert_eq!(session.find_id(""), None);
    }

    #[test]
    fn analyze_with_stores_result_and_keeps_images() -> anyhow::Result<()> {
        let mut session = session_with(&["a.png", "b.png"]);
        let analyzer = analyzer_with(RecordingClient::replying(VALID_RESPONSE));

        match session.analyze_with(&analyzer)? {
            SessionOutcome::Result(report) => {
                assert_eq!(report.result.font_name, "Helvetica Neue");
                assert_eq!(report.image_count, 2);
            }
            other => panic!("expected result, got {other:?}"),
        }
        assert!(!session.is_in_flight());
        assert_eq!(session.images().len(), 2);
        Ok(())
    }

    #[test]
    fn failed_analysis_replaces_prior_result_with_error() -> anyhow::Result<()> {
        let mut session = session_with(&["a.png"]);
        session.analyze_with(&analyzer_with(RecordingClient::replying(VALID_RESPONSE)))?;

        let failing = analyzer_with(RecordingClient::failing("Gemini request failed (500)"));
        match session.analyze_with(&failing)? {
            SessionOutcome::Error {
                message,
                raw_response,
            } => {
                assert!(message.contains("500"));
                assert!(raw_response.is_none());
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert!(matches!(session.outcome(), Some(SessionOutcome::Error { .. })));
        Ok(())
    }

    #[test]
    fn adding_images_clears_last_outcome() -> anyhow::Result<()> {
        let mut session = session_with(&["a.png"]);
        session.finish_analysis(SessionOutcome::error("old"));
        session.add_assets(vec![png("b.png")])?;
        assert!(session.outcome().is_none());
        Ok(())
    }

    #[test]
    fn dropping_session_releases_remaining_previews() {
        struct Shared(std::rc::Rc<std::cell::RefCell<PreviewRegistry>>);

        impl PreviewStore for Shared {
            fn create(&mut self, asset: &ImageAsset) -> PreviewHandle {
                self.0.borrow_mut().create(asset)
            }

            fn release(&mut self, handle: PreviewHandle) {
                self.0.borrow_mut().release(handle)
            }
        }

        let registry = std::rc::Rc::new(std::cell::RefCell::new(PreviewRegistry::default()));
        {
            let mut session = AnalysisSession::new(Shared(registry.clone()));
            session
                .add_assets(vec![png("a.png"), png("b.png")])
                .expect("session idle");
            let first = session.images()[0].asset.id().to_string();
            session.remove(&first).expect("session idle");
        }
        assert_eq!(registry.borrow().live_count(), 0);
        assert_eq!(registry.borrow().release_count(), 2);
        assert_eq!(registry.borrow().double_release_count(), 0);
    }

    #[test]
    fn malformed_answer_keeps_raw_text_in_outcome() -> anyhow::Result<()> {
        let mut session = session_with(&["a.png"]);
        let analyzer = analyzer_with(RecordingClient::replying("Looks like Futura to me."));
        match session.analyze_with(&analyzer)? {
            SessionOutcome::Error {
                message,
                raw_response,
            } => {
                assert!(message.starts_with("malformed model response"));
                assert_eq!(raw_response.as_deref(), Some("Looks like Futura to me."));
            }
            other => panic!("expected error, got {other:?}"),
        }
        Ok(())
    }
}
