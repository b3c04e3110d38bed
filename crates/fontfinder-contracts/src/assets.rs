use std::fs;
use std::path::Path;

use anyhow::Context;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Media types the hosted model accepts as inline image data.
pub const SUPPORTED_MEDIA_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/heic",
    "image/heif",
];

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// A user-supplied image held in memory until it is submitted or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    id: String,
    file_name: String,
    media_type: String,
    bytes: Vec<u8>,
}

impl ImageAsset {
    pub fn new(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_name: file_name.into(),
            media_type: normalize_media_type(&media_type.into()),
            bytes,
        }
    }

    /// Reads an image from disk. The media type comes from the file extension,
    /// then from the content signature when the extension says nothing.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let media_type = media_type_for_path(path)
            .or_else(|| sniff_media_type(&bytes))
            .unwrap_or(FALLBACK_MEDIA_TYPE);
        let file_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(file_name, media_type, bytes))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True for anything in the `image/*` family, supported or not.
    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

pub fn normalize_media_type(raw: &str) -> String {
    let essence = raw.split(';').next().unwrap_or_default().trim();
    let lowered = essence.to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => lowered,
    }
}

pub fn is_supported_media_type(media_type: &str) -> bool {
    let normalized = normalize_media_type(media_type);
    SUPPORTED_MEDIA_TYPES
        .iter()
        .any(|supported| *supported == normalized)
}

pub fn media_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        "avif" => Some("image/avif"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

pub fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}
