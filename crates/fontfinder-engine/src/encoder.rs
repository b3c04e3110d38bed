use std::thread;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use fontfinder_contracts::assets::{is_supported_media_type, ImageAsset};
use serde_json::{json, Value};

use crate::error::{AnalysisError, AnalysisResult};

/// Transport form of one [`ImageAsset`]: media type plus base64 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPart {
    pub source_id: String,
    pub media_type: String,
    pub data: String,
}

impl EncodedPart {
    pub fn to_inline_data(&self) -> Value {
        json!({
            "inlineData": {
                "mimeType": self.media_type,
                "data": self.data,
            }
        })
    }
}

pub fn encode(asset: &ImageAsset) -> AnalysisResult<EncodedPart> {
    if !is_supported_media_type(asset.media_type()) {
        return Err(AnalysisError::UnsupportedMediaType {
            file_name: asset.file_name().to_string(),
            media_type: asset.media_type().to_string(),
        });
    }
    Ok(EncodedPart {
        source_id: asset.id().to_string(),
        media_type: asset.media_type().to_string(),
        data: BASE64.encode(asset.bytes()),
    })
}

/// Upper bound on encoder threads regardless of available cores.
pub const MAX_ENCODE_WORKERS: usize = 8;

/// Encodes assets on a bounded set of scoped threads, each taking a
/// contiguous chunk, and returns the parts in input order. The first failure
/// in input order wins.
pub fn encode_all(assets: &[ImageAsset]) -> AnalysisResult<Vec<EncodedPart>> {
    let available = thread::available_parallelism().map_or(1, usize::from);
    let workers = worker_count(assets.len(), available);
    if workers <= 1 {
        return assets.iter().map(encode).collect();
    }
    let chunk_size = assets.len().div_ceil(workers);

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for (idx, chunk) in assets.chunks(chunk_size).enumerate() {
            let handle = thread::Builder::new()
                .name(format!("fontfinder-encode-{idx}"))
                .spawn_scoped(scope, move || chunk.iter().map(encode).collect::<Vec<_>>())
                .map_err(|err| {
                    AnalysisError::Unknown(format!("failed to start encoder thread: {err}"))
                })?;
            handles.push((chunk, handle));
        }

        // All workers are joined before any result is inspected.
        let joined: Vec<_> = handles
            .into_iter()
            .map(|(chunk, handle)| (chunk, handle.join()))
            .collect();
        let mut parts = Vec::with_capacity(assets.len());
        for (chunk, encoded) in joined {
            let encoded = encoded.map_err(|_| {
                AnalysisError::Unknown(format!(
                    "encoder thread panicked while encoding {}",
                    chunk.first().map(ImageAsset::file_name).unwrap_or_default()
                ))
            })?;
            for part in encoded {
                parts.push(part?);
            }
        }
        Ok(parts)
    })
}

fn worker_count(items: usize, available: usize) -> usize {
    items.min(available).clamp(1, MAX_ENCODE_WORKERS)
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use fontfinder_contracts::assets::ImageAsset;
    use serde_json::json;

    use super::{encode, encode_all, worker_count, BASE64, MAX_ENCODE_WORKERS};
    use crate::error::AnalysisError;

    #[test]
    fn encode_produces_standard_base64_with_media_type() -> anyhow::Result<()> {
        let asset = ImageAsset::new("glyphs.png", "image/png", b"glyph-bytes".to_vec());
        let part = encode(&asset)?;
        assert_eq!(part.media_type, "image/png");
        assert_eq!(part.source_id, asset.id());
        assert_eq!(BASE64.decode(part.data.as_bytes())?, b"glyph-bytes");
        assert_eq!(
            part.to_inline_data(),
            json!({"inlineData": {"mimeType": "image/png", "data": "Z2x5cGgtYnl0ZXM="}})
        );
        Ok(())
    }

    #[test]
    fn encode_normalizes_jpg_alias() -> anyhow::Result<()> {
        let asset = ImageAsset::new("photo.jpg", "image/jpg", vec![0xff, 0xd8]);
        assert_eq!(encode(&asset)?.media_type, "image/jpeg");
        Ok(())
    }

    #[test]
    fn encode_rejects_unsupported_media_type() {
        let asset = ImageAsset::new("anim.gif", "image/gif", vec![1, 2, 3]);
        match encode(&asset) {
            Err(AnalysisError::UnsupportedMediaType {
                file_name,
                media_type,
            }) => {
                assert_eq!(file_name, "anim.gif");
                assert_eq!(media_type, "image/gif");
            }
            other => panic!("expected UnsupportedMediaType, got {other:?}"),
        }
    }

    #[test]
    fn encode_all_preserves_upload_order() -> anyhow::Result<()> {
        for count in 1..=10usize {
            let assets: Vec<ImageAsset> = (0..count)
                .map(|idx| {
                    // Larger early payloads so completion order differs from input order.
                    let bytes = vec![idx as u8; (count - idx) * 4096];
                    ImageAsset::new(format!("sample-{idx}.png"), "image/png", bytes)
                })
                .collect();
            let parts = encode_all(&assets)?;
            assert_eq!(parts.len(), count);
            for (asset, part) in assets.iter().zip(&parts) {
                assert_eq!(part.source_id, asset.id());
                assert_eq!(BASE64.decode(part.data.as_bytes())?, asset.bytes());
            }
        }
        Ok(())
    }

    #[test]
    fn encode_all_reports_first_failure_in_input_order() {
        let assets = vec![
            ImageAsset::new("ok.png", "image/png", vec![1]),
            ImageAsset::new("first.bmp", "image/bmp", vec![2]),
            ImageAsset::new("second.gif", "image/gif", vec![3]),
        ];
        match encode_all(&assets) {
            Err(AnalysisError::UnsupportedMediaType { file_name, .. }) => {
                assert_eq!(file_name, "first.bmp");
            }
            other => panic!("expected UnsupportedMediaType, got {other:?}"),
        }
    }

    #[test]
    fn encode_all_of_nothing_is_empty() -> anyhow::Result<()> {
        assert!(encode_all(&[])?.is_empty());
        Ok(())
    }

    #[test]
    fn worker_count_is_bounded() {
        assert_eq!(worker_count(0, 16), 1);
        assert_eq!(worker_count(3, 16), 3);
        assert_eq!(worker_count(40, 4), 4);
        assert_eq!(worker_count(40, 64), MAX_ENCODE_WORKERS);
    }

    #[test]
    fn encode_all_keeps_order_beyond_worker_limit() -> anyhow::Result<()> {
        let assets: Vec<ImageAsset> = (0..(MAX_ENCODE_WORKERS * 5 + 3))
            .map(|idx| {
                ImageAsset::new(format!("bulk-{idx}.webp"), "image/webp", vec![idx as u8; 64])
            })
            .collect();
        let parts = encode_all(&assets)?;
        let expected: Vec<&str> = assets.iter().map(ImageAsset::id).collect();
        let actual: Vec<&str> = parts.iter().map(|part| part.source_id.as_str()).collect();
        assert_eq!(actual, expected);
        Ok(())
    }
}
