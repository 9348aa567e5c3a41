//! Core frame types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// SHA-256 content hash of a decoded frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Wrap a raw digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 16 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid fingerprint {s:?}: {e}"))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| format!("fingerprint must be 32 bytes: {s:?}"))?;
        Ok(Self(digest))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_string()
    }
}

/// A frame as produced by the extractor, before fingerprinting.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFrame {
    /// Source frame number. Frames sampled with a stride are numbered in
    /// source frames; after mpdecimate this is the position among survivors.
    pub ordinal: u64,
    /// Presentation time in seconds.
    pub timestamp: f64,
    /// Decoded image on disk.
    pub path: PathBuf,
}

/// A fingerprinted frame. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: u64,
    pub timestamp: f64,
    pub fingerprint: Fingerprint,
    pub source: PathBuf,
}

impl Frame {
    pub fn new(index: u64, timestamp: f64, fingerprint: Fingerprint, source: PathBuf) -> Self {
        Self {
            index,
            timestamp,
            fingerprint,
            source,
        }
    }
}

/// Image format used for extracted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// Lossless PNG.
    #[default]
    Png,
    /// JPEG, required when frames are size-reduced with jpegoptim.
    #[serde(alias = "jpeg")]
    Jpg,
}

impl FrameFormat {
    /// File extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            FrameFormat::Png => "png",
            FrameFormat::Jpg => "jpg",
        }
    }

    /// Encoder used when writing frames of this format.
    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            FrameFormat::Png => image::ImageFormat::Png,
            FrameFormat::Jpg => image::ImageFormat::Jpeg,
        }
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FrameFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(FrameFormat::Png),
            "jpg" | "jpeg" => Ok(FrameFormat::Jpg),
            _ => Err(format!("Unknown frame format: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_hex_roundtrip() {
        let fp = Fingerprint::from_digest([0xab; 32]);
        let text = fp.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<Fingerprint>().unwrap(), fp);
        assert_eq!(fp.short(), "abababababababab");
    }

    #[test]
    fn fingerprint_rejects_short_hex() {
        assert!("abcd".parse::<Fingerprint>().is_err());
        assert!("zz".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn fingerprint_serializes_as_string() {
        let fp = Fingerprint::from_digest([1; 32]);
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    #[test]
    fn frame_format_parsing() {
        assert_eq!("PNG".parse::<FrameFormat>().unwrap(), FrameFormat::Png);
        assert_eq!("jpeg".parse::<FrameFormat>().unwrap(), FrameFormat::Jpg);
        assert!("webp".parse::<FrameFormat>().is_err());
        assert_eq!(FrameFormat::Jpg.extension(), "jpg");
    }
}
