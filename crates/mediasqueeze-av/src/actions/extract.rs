//! Frame extraction with ffmpeg.
//!
//! Frames are decoded to numbered image files and their presentation times
//! are recovered from the `showinfo` filter's log lines on stderr.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use async_trait::async_trait;
use mediasqueeze_frames::{ExtractedFrame, FrameFormat};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::tools::{ToolConfig, ToolRegistry};
use crate::{Error, Result};

/// Rectangle kept by the crop filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crop {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }
}

impl FromStr for Crop {
    type Err = String;

    /// Parses `W:H:X:Y`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [w, h, x, y] = parts.as_slice() else {
            return Err(format!("Crop must be W:H:X:Y, got {s:?}"));
        };
        let num = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| format!("Invalid crop value {v:?}: {e}"))
        };
        let crop = Crop {
            width: num(*w)?,
            height: num(*h)?,
            x: num(*x)?,
            y: num(*y)?,
        };
        if crop.width == 0 || crop.height == 0 {
            return Err(format!("Crop size must be non-zero, got {s:?}"));
        }
        Ok(crop)
    }
}

/// How frames are sampled from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// Keep every `stride`-th frame.
    pub stride: u32,
    pub crop: Option<Crop>,
    /// Let ffmpeg drop near-identical frames before they are written.
    pub mpdecimate: bool,
    pub format: FrameFormat,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            stride: 1,
            crop: None,
            mpdecimate: false,
            format: FrameFormat::Png,
        }
    }
}

/// Decodes a video into timestamped image files.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Extract frames of `source` into `out_dir`, in temporal order.
    async fn extract(
        &self,
        source: &Path,
        options: &ExtractOptions,
        out_dir: &Path,
    ) -> Result<Vec<ExtractedFrame>>;
}

/// [`FrameExtractor`] backed by the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    tool: ToolConfig,
    cancel: CancellationToken,
}

impl FfmpegExtractor {
    pub fn new(tools: &ToolRegistry, cancel: CancellationToken) -> Result<Self> {
        Ok(Self {
            tool: tools.require("ffmpeg")?.clone(),
            cancel,
        })
    }
}

#[async_trait]
impl FrameExtractor for FfmpegExtractor {
    async fn extract(
        &self,
        source: &Path,
        options: &ExtractOptions,
        out_dir: &Path,
    ) -> Result<Vec<ExtractedFrame>> {
        if !source.is_file() {
            return Err(Error::file_not_found(source));
        }
        if options.stride == 0 {
            return Err(Error::InvalidInput("stride must be at least 1".into()));
        }
        tokio::fs::create_dir_all(out_dir).await?;

        tracing::info!(
            "Extracting frames from {:?} (stride {}, {})",
            source,
            options.stride,
            options.format
        );

        let mut cmd = self.tool.command();
        cmd.args(extract_args(source, options, out_dir))
            .cancel_on(self.cancel.clone());
        let output = cmd.execute().await?;

        let timestamps = parse_pts_times(&output.stderr);
        let files = list_raw_frames(out_dir, options.format).await?;
        if files.is_empty() {
            return Err(Error::InvalidInput(format!(
                "no frames could be extracted from {}",
                source.display()
            )));
        }
        if files.len() != timestamps.len() {
            tracing::warn!(
                "ffmpeg wrote {} frames but reported {} timestamps; keeping {}",
                files.len(),
                timestamps.len(),
                files.len().min(timestamps.len())
            );
        }

        let frames = number_frames(files, timestamps, options);

        tracing::info!("Extracted {} frames", frames.len());
        Ok(frames)
    }
}

/// Pair written files with their timestamps and number them by source frame.
///
/// With a stride the n-th written file is source frame `n * stride`. mpdecimate
/// drops frames without reporting which, so its output keeps sequence positions.
pub fn number_frames(
    files: Vec<PathBuf>,
    timestamps: Vec<f64>,
    options: &ExtractOptions,
) -> Vec<ExtractedFrame> {
    let step = if options.mpdecimate {
        1
    } else {
        u64::from(options.stride.max(1))
    };
    files
        .into_iter()
        .zip(timestamps)
        .enumerate()
        .map(|(n, (path, timestamp))| ExtractedFrame {
            ordinal: n as u64 * step,
            timestamp,
            path,
        })
        .collect()
}

/// Filter chain: crop, stride selection, optional mpdecimate, then showinfo.
pub fn filter_chain(options: &ExtractOptions) -> String {
    let mut filters = Vec::new();
    if let Some(crop) = options.crop {
        filters.push(format!("crop={crop}"));
    }
    if options.stride > 1 {
        filters.push(format!("select='not(mod(n\\,{}))'", options.stride));
    }
    if options.mpdecimate {
        filters.push("mpdecimate=hi=768:lo=320:frac=0.33".to_string());
    }
    filters.push("showinfo".to_string());
    filters.join(",")
}

/// Full ffmpeg argument list for an extraction.
pub fn extract_args(source: &Path, options: &ExtractOptions, out_dir: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-y".into(),
        "-i".into(),
        source.into(),
        "-vf".into(),
        filter_chain(options).into(),
        "-fps_mode".into(),
        "vfr".into(),
        "-start_number".into(),
        "0".into(),
    ];
    if options.format == FrameFormat::Jpg {
        args.push("-q:v".into());
        args.push("2".into());
    }
    args.push(
        out_dir
            .join(format!("raw_%08d.{}", options.format.extension()))
            .into(),
    );
    args
}

/// Presentation times from `showinfo` lines, in output order.
pub fn parse_pts_times(stderr: &str) -> Vec<f64> {
    static PTS_TIME: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = PTS_TIME
        .get_or_init(|| Regex::new(r"pts_time:\s*(-?[0-9.]+)").ok())
        .as_ref()
    else {
        return Vec::new();
    };

    stderr
        .lines()
        .filter(|line| line.contains("showinfo"))
        .filter_map(|line| re.captures(line))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .collect()
}

async fn list_raw_frames(dir: &Path, format: FrameFormat) -> Result<Vec<PathBuf>> {
    let suffix = format!(".{}", format.extension());
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("raw_") && name.ends_with(&suffix) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
