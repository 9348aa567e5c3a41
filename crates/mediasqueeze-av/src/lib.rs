//! # mediasqueeze-av
//!
//! External tool adapters for the mediasqueeze pipelines.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find jpegoptim, exiftool,
//!   ffmpeg and ffprobe, and gate them on supported versions.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   and cancellation support for running external processes.
//! - **Workspace management** ([`Workspace`]) -- private temporary directory
//!   with a staging output that only reaches its destination on success.
//! - **Probing** ([`probe_video`]) -- video properties from ffprobe.
//! - **Actions** ([`actions`]) -- JPEG size reduction ([`SizeReducer`]),
//!   metadata copying, Tinify compression ([`RemoteCompressor`]), frame
//!   extraction ([`FrameExtractor`]) and muxing.

pub mod actions;
pub mod command;
mod error;
pub mod probe;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use error::{Error, RemoteError, Result};
pub use probe::{probe_video, VideoInfo};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry, ToolsConfig};
pub use workspace::Workspace;

pub use actions::{
    copy_metadata, mux, pack_animated_webp, CompressedImage, Crop, EncodeParams, ExtractOptions,
    FfmpegExtractor, FrameExtractor, Jpegoptim, RemoteCompressor, SizeReducer, TinifyClient,
};
