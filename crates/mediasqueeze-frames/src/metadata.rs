//! `metadata.json`, written next to extracted unique frames.

use crate::packed::{unpack_animated_webp, FrameLayout, ANIMATED_WEBP_FILE};
use crate::{
    DroppedFrame, Error, Fingerprint, Frame, FrameFormat, FrameIndex, Result, SourceTiming,
    UniqueFrame,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the metadata document inside a frames directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Current metadata format version.
pub const METADATA_VERSION: &str = "1.0";

/// Properties of the source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
    pub frame_count: u64,
}

/// One unique frame on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEntry {
    pub id: usize,
    pub frame_index: u64,
    pub timestamp: f64,
    pub fingerprint: Fingerprint,
    /// File name relative to the frames directory.
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramesMetadata {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub source: SourceInfo,
    pub frame_format: FrameFormat,
    #[serde(default)]
    pub layout: FrameLayout,
    pub stride: u32,
    pub unique_frames: Vec<FrameEntry>,
    pub duplicates_count: usize,
    #[serde(default)]
    pub dropped_frames: Vec<DroppedFrame>,
}

impl FramesMetadata {
    /// File name used for the unique frame with the given id.
    pub fn frame_file_name(id: usize, format: FrameFormat) -> String {
        format!("frame_{id:06}.{}", format.extension())
    }

    /// ffmpeg image-sequence pattern matching [`Self::frame_file_name`].
    pub fn frame_file_pattern(format: FrameFormat) -> String {
        format!("frame_%06d.{}", format.extension())
    }

    /// Describe an index whose unique frames are written with [`Self::frame_file_name`].
    pub fn from_index(
        index: &FrameIndex,
        source: SourceInfo,
        frame_format: FrameFormat,
        stride: u32,
    ) -> Self {
        let unique_frames = index
            .uniques()
            .iter()
            .map(|u| FrameEntry {
                id: u.id,
                frame_index: u.frame.index,
                timestamp: u.frame.timestamp,
                fingerprint: u.frame.fingerprint,
                file: Self::frame_file_name(u.id, frame_format),
            })
            .collect();

        Self {
            version: METADATA_VERSION.to_string(),
            created_at: Utc::now(),
            source,
            frame_format,
            layout: FrameLayout::Files,
            stride,
            unique_frames,
            duplicates_count: index.duplicates().len(),
            dropped_frames: index.dropped().to_vec(),
        }
    }

    /// Path of the metadata file inside `dir`.
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(METADATA_FILE)
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = Self::path_in(dir);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Load and validate the metadata in `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::path_in(dir);
        if !path.exists() {
            return Err(Error::metadata(format!("{} not found", path.display())));
        }
        let contents = std::fs::read_to_string(&path)?;
        let metadata: Self = serde_json::from_str(&contents)?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Check version and ordering of the unique frame entries.
    pub fn validate(&self) -> Result<()> {
        if self.version.split('.').next() != METADATA_VERSION.split('.').next() {
            return Err(Error::metadata(format!(
                "unsupported metadata version {}",
                self.version
            )));
        }
        if self.unique_frames.is_empty() {
            return Err(Error::metadata("no unique frames listed"));
        }
        for (expected, entry) in self.unique_frames.iter().enumerate() {
            if entry.id != expected {
                return Err(Error::metadata(format!(
                    "unique frame ids must be dense, found {} at position {}",
                    entry.id, expected
                )));
            }
        }
        for pair in self.unique_frames.windows(2) {
            if pair[1].timestamp < pair[0].timestamp || pair[1].frame_index <= pair[0].frame_index
            {
                return Err(Error::metadata(format!(
                    "unique frame {} is out of order",
                    pair[1].id
                )));
            }
        }
        Ok(())
    }

    /// Source timing for timeline planning.
    pub fn timing(&self) -> SourceTiming {
        SourceTiming::new(self.source.duration, self.source.fps)
    }

    /// Unique frames of the frames directory `dir`, whatever its layout.
    ///
    /// A packed directory is unpacked into `scratch` first and the frames
    /// resolve there.
    pub fn resolve_frames(&self, dir: &Path, scratch: &Path) -> Result<Vec<UniqueFrame>> {
        match self.layout {
            FrameLayout::Files => self.unique_frames(dir),
            FrameLayout::AnimatedWebp => {
                let packed = dir.join(ANIMATED_WEBP_FILE);
                if !packed.is_file() {
                    return Err(Error::metadata(format!(
                        "packed frames {} are missing",
                        packed.display()
                    )));
                }
                let names: Vec<String> =
                    self.unique_frames.iter().map(|e| e.file.clone()).collect();
                unpack_animated_webp(&packed, &names, self.frame_format, scratch)?;
                self.unique_frames(scratch)
            }
        }
    }

    /// Unique frames with their sources resolved against `dir`.
    pub fn unique_frames(&self, dir: &Path) -> Result<Vec<UniqueFrame>> {
        self.unique_frames
            .iter()
            .map(|entry| {
                let source = dir.join(&entry.file);
                if !source.is_file() {
                    return Err(Error::metadata(format!(
                        "frame file {} is missing",
                        source.display()
                    )));
                }
                Ok(UniqueFrame {
                    id: entry.id,
                    frame: Frame::new(entry.frame_index, entry.timestamp, entry.fingerprint, source),
                })
            })
            .collect()
    }
}
