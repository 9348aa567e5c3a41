//! Content fingerprinting of decoded frames.
//!
//! A fingerprint is a SHA-256 digest over the frame dimensions and its RGBA8
//! pixel buffer, so two files that decode to the same pixels match regardless
//! of how they were encoded. Matching is exact; there is no similarity threshold.

use crate::{DroppedFrame, Error, ExtractedFrame, Fingerprint, Frame, Result};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Fingerprint an in-memory pixel buffer.
pub fn fingerprint_pixels(width: u32, height: u32, pixels: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(width.to_le_bytes());
    hasher.update(height.to_le_bytes());
    hasher.update(pixels);
    Fingerprint::from_digest(hasher.finalize().into())
}

/// Decode an image file and fingerprint its pixels.
pub fn fingerprint_image(ordinal: u64, path: &Path) -> Result<Fingerprint> {
    let image = image::open(path).map_err(|e| Error::Decode {
        ordinal,
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let rgba = image.to_rgba8();
    Ok(fingerprint_pixels(rgba.width(), rgba.height(), rgba.as_raw()))
}

/// Fingerprint every extracted frame in parallel.
///
/// The output has the same order as the input. Frames that fail to decode
/// come back as [`DroppedFrame`] so the caller can report and skip them.
pub fn fingerprint_all(frames: Vec<ExtractedFrame>) -> Vec<std::result::Result<Frame, DroppedFrame>> {
    frames
        .into_par_iter()
        .map(|extracted| match fingerprint_image(extracted.ordinal, &extracted.path) {
            Ok(fingerprint) => Ok(Frame::new(
                extracted.ordinal,
                extracted.timestamp,
                fingerprint,
                extracted.path,
            )),
            Err(e) => {
                tracing::warn!("Dropping frame {}: {}", extracted.ordinal, e);
                Err(DroppedFrame {
                    frame_index: extracted.ordinal,
                    timestamp: extracted.timestamp,
                    reason: e.to_string(),
                })
            }
        })
        .collect()
}
