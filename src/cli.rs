use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use mediasqueeze::config::{MetadataMode, ReassembleMode};
use mediasqueeze_av::Crop;
use mediasqueeze_frames::{FrameFormat, FrameLayout, LinkStrategy};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediasqueeze")]
#[command(
    author,
    version,
    about = "Content-aware media size reduction for images and slide recordings"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Frame compression used by optimize-recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompressChoice {
    None,
    Jpegoptim,
    Tinify,
}

/// Encoder overrides shared by the video commands
#[derive(Debug, Clone, clap::Args)]
pub struct EncodeArgs {
    /// Video codec
    #[arg(long)]
    pub codec: Option<String>,

    /// Constant rate factor
    #[arg(long)]
    pub crf: Option<u32>,

    /// Encoder preset
    #[arg(long)]
    pub preset: Option<String>,

    /// Timeline mode (vfr or cfr)
    #[arg(long)]
    pub mode: Option<ReassembleMode>,

    /// Output frame rate in cfr mode
    #[arg(long)]
    pub fps: Option<f64>,

    /// How repeated frames are written (hard, symbolic, copy, hard-or-copy)
    #[arg(long)]
    pub link: Option<LinkStrategy>,

    /// Re-encode audio with this codec instead of copying it
    #[arg(long)]
    pub audio_codec: Option<String>,

    /// Audio bitrate for --audio-codec, e.g. 128k
    #[arg(long, requires = "audio_codec")]
    pub audio_bitrate: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reduce a JPEG below a size limit with jpegoptim
    ReduceJpegSize {
        /// Input JPEG (reads stdin if omitted)
        input: Option<PathBuf>,

        /// Output file (writes stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target size in KB
        #[arg(long = "max-size")]
        max_size: Option<u64>,

        /// Maximum number of jpegoptim runs
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Replace an existing output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Compress an image with the Tinify API
    CompressImage {
        /// Input image (reads stdin if omitted)
        input: Option<PathBuf>,

        /// Output file (writes stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Tinify API key
        #[arg(long)]
        api_key: Option<String>,

        /// Keep or strip the original metadata
        #[arg(long)]
        metadata: Option<MetadataMode>,

        /// Replace an existing output file
        #[arg(long)]
        overwrite: bool,

        /// Send inputs above the 15 MiB safety limit
        #[arg(long)]
        disable_hard_limit: bool,
    },

    /// Write each distinct frame of a video plus metadata.json
    ExtractUniqueFrames {
        /// Input video
        input: PathBuf,

        /// Directory for the frames
        output_dir: PathBuf,

        /// Keep every n-th frame
        #[arg(long)]
        stride: Option<u32>,

        /// Crop rectangle W:H:X:Y
        #[arg(long)]
        crop: Option<Crop>,

        /// Drop near-identical frames in ffmpeg first
        #[arg(long)]
        mpdecimate: bool,

        /// Frame image format (png or jpg)
        #[arg(long)]
        format: Option<FrameFormat>,

        /// Store frames as files or packed into one animated WebP (files, animated-webp)
        #[arg(long)]
        layout: Option<FrameLayout>,

        /// Replace frames in a non-empty directory
        #[arg(long)]
        overwrite: bool,
    },

    /// Rebuild a video from extracted frames
    ReassembleVideo {
        /// Directory written by extract-unique-frames
        frames_dir: PathBuf,

        /// Output video
        output: PathBuf,

        /// Audio track to include
        #[arg(long)]
        audio: Option<PathBuf>,

        #[command(flatten)]
        encode: EncodeArgs,

        /// Replace an existing output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Deduplicate a slide recording end to end
    OptimizeRecording {
        /// Input video
        input: PathBuf,

        /// Output video
        output: PathBuf,

        /// Audio track to use instead of the input's
        #[arg(long)]
        audio: Option<PathBuf>,

        /// Keep every n-th frame
        #[arg(long)]
        stride: Option<u32>,

        /// Crop rectangle W:H:X:Y
        #[arg(long)]
        crop: Option<Crop>,

        /// Drop near-identical frames in ffmpeg first
        #[arg(long)]
        mpdecimate: bool,

        /// Frame image format (png or jpg)
        #[arg(long)]
        format: Option<FrameFormat>,

        /// Compression applied to each unique frame
        #[arg(long, value_enum, default_value_t = CompressChoice::None)]
        compress: CompressChoice,

        /// Per-frame target in KB for jpegoptim
        #[arg(long)]
        frame_max_size: Option<u64>,

        /// Tinify API key for --compress tinify
        #[arg(long)]
        api_key: Option<String>,

        #[command(flatten)]
        encode: EncodeArgs,

        /// Emit run statistics as one JSON line
        #[arg(long)]
        stats_json: bool,

        /// Replace an existing output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Probe a video and display its properties
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config or defaults if not specified)
        #[arg(value_name = "CONFIG")]
        path: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
