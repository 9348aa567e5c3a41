use mediasqueeze_av::actions::tinify::DEFAULT_BASE_URL;
use mediasqueeze_av::{EncodeParams, ToolsConfig};
use mediasqueeze_frames::{FrameFormat, FrameLayout, LinkStrategy, TimelineMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub reduce: ReduceConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub extract: ExtractConfig,

    #[serde(default)]
    pub reassemble: ReassembleConfig,
}

/// Defaults for `reduce-jpeg-size`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReduceConfig {
    /// Target size in KB (1 KB = 1024 bytes)
    #[serde(default = "default_max_size_kb")]
    pub max_size_kb: u64,

    /// Maximum number of jpegoptim invocations per file
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            max_size_kb: default_max_size_kb(),
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_max_size_kb() -> u64 {
    4999
}

fn default_max_iterations() -> u32 {
    10
}

/// Remote compression service settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    /// Tinify API key. `MEDIASQUEEZE_TINIFY_KEY` takes precedence.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Inputs larger than this are refused unless the limit is disabled
    #[serde(default = "default_hard_limit_bytes")]
    pub hard_limit_bytes: u64,

    #[serde(default)]
    pub metadata: MetadataMode,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            hard_limit_bytes: default_hard_limit_bytes(),
            metadata: MetadataMode::default(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_hard_limit_bytes() -> u64 {
    15 * 1024 * 1024
}

/// Whether compressed images get the original's metadata back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataMode {
    #[default]
    Keep,
    Strip,
}

impl fmt::Display for MetadataMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataMode::Keep => f.write_str("keep"),
            MetadataMode::Strip => f.write_str("strip"),
        }
    }
}

impl FromStr for MetadataMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep" => Ok(MetadataMode::Keep),
            "strip" => Ok(MetadataMode::Strip),
            _ => Err(format!("Unknown metadata mode: {}", s)),
        }
    }
}

/// Frame extraction defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractConfig {
    /// Keep every n-th decoded frame
    #[serde(default = "default_stride")]
    pub stride: u32,

    #[serde(default)]
    pub format: FrameFormat,

    /// Frame storage used by extract-unique-frames
    #[serde(default)]
    pub layout: FrameLayout,

    #[serde(default)]
    pub mpdecimate: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            stride: default_stride(),
            format: FrameFormat::default(),
            layout: FrameLayout::default(),
            mpdecimate: false,
        }
    }
}

fn default_stride() -> u32 {
    1
}

/// Timeline reconstruction and encoding defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReassembleConfig {
    #[serde(default)]
    pub mode: ReassembleMode,

    /// Output tick rate in constant-rate mode
    #[serde(default = "default_fps")]
    pub fps: f64,

    #[serde(default)]
    pub link_strategy: LinkStrategy,

    #[serde(default)]
    pub encode: EncodeParams,
}

impl Default for ReassembleConfig {
    fn default() -> Self {
        Self {
            mode: ReassembleMode::default(),
            fps: default_fps(),
            link_strategy: LinkStrategy::default(),
            encode: EncodeParams::default(),
        }
    }
}

impl ReassembleConfig {
    /// Timeline mode after applying optional CLI overrides.
    pub fn timeline_mode(&self, mode: Option<ReassembleMode>, fps: Option<f64>) -> TimelineMode {
        match mode.unwrap_or(self.mode) {
            ReassembleMode::Vfr => TimelineMode::Vfr,
            ReassembleMode::Cfr => TimelineMode::Cfr {
                fps: fps.unwrap_or(self.fps),
            },
        }
    }
}

fn default_fps() -> f64 {
    25.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReassembleMode {
    #[default]
    Vfr,
    Cfr,
}

impl FromStr for ReassembleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vfr" => Ok(ReassembleMode::Vfr),
            "cfr" => Ok(ReassembleMode::Cfr),
            _ => Err(format!("Unknown mode: {} (expected vfr or cfr)", s)),
        }
    }
}
