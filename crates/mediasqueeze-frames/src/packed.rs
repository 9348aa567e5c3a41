//! Frames directories holding one animated WebP instead of per-frame files.
//!
//! Packing is done by the muxer's ffmpeg; this module only knows the layout
//! and how to turn the animation back into individual frame files.

use crate::{Error, FrameFormat, Result};
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File name of the animation inside a packed frames directory.
pub const ANIMATED_WEBP_FILE: &str = "frames.webp";

/// How unique frames are stored in a frames directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameLayout {
    /// One image file per unique frame.
    #[default]
    Files,
    /// All unique frames, in order, as the frames of one animated WebP.
    AnimatedWebp,
}

impl fmt::Display for FrameLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameLayout::Files => f.write_str("files"),
            FrameLayout::AnimatedWebp => f.write_str("animated-webp"),
        }
    }
}

impl FromStr for FrameLayout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "files" => Ok(FrameLayout::Files),
            "animated-webp" | "webp" => Ok(FrameLayout::AnimatedWebp),
            _ => Err(format!("Unknown frame layout: {}", s)),
        }
    }
}

/// Decode the animation at `packed` and write its frames into `out_dir`
/// under `names`, in order, encoded as `format`.
///
/// The animation must hold exactly one frame per name.
pub fn unpack_animated_webp(
    packed: &Path,
    names: &[String],
    format: FrameFormat,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let unpack_err = |message: String| Error::Unpack {
        path: packed.to_path_buf(),
        message,
    };

    let frames = decode_frames(packed).map_err(|e| unpack_err(e.to_string()))?;
    if frames.len() != names.len() {
        return Err(unpack_err(format!(
            "holds {} frames, metadata lists {}",
            frames.len(),
            names.len()
        )));
    }

    std::fs::create_dir_all(out_dir)?;
    let mut written = Vec::with_capacity(names.len());
    for (buffer, name) in frames.into_iter().zip(names) {
        let target = out_dir.join(name);
        // JPEG has no alpha channel
        let image = DynamicImage::ImageRgba8(buffer).to_rgb8();
        image
            .save_with_format(&target, format.image_format())
            .map_err(|e| unpack_err(format!("writing {}: {e}", target.display())))?;
        written.push(target);
    }

    tracing::debug!("Unpacked {} frames from {:?}", written.len(), packed);
    Ok(written)
}

fn decode_frames(packed: &Path) -> image::ImageResult<Vec<RgbaImage>> {
    let reader = BufReader::new(File::open(packed)?);
    let frames = WebPDecoder::new(reader)?.into_frames().collect_frames()?;
    if !frames.is_empty() {
        return Ok(frames.into_iter().map(|f| f.into_buffer()).collect());
    }

    // A still WebP yields no animation frames
    Ok(vec![image::open(packed)?.to_rgba8()])
}
