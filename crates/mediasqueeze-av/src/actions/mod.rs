//! Tool actions: JPEG size reduction, metadata copying, remote compression,
//! frame extraction, frame packing and video muxing.

pub mod exiftool;
pub mod extract;
pub mod jpegoptim;
pub mod mux;
pub mod pack;
pub mod tinify;

pub use exiftool::{copy_metadata, DEFAULT_EXCLUDED_TAGS};
pub use extract::{Crop, ExtractOptions, FfmpegExtractor, FrameExtractor};
pub use jpegoptim::{Jpegoptim, SizeReducer};
pub use mux::{mux, EncodeParams};
pub use pack::pack_animated_webp;
pub use tinify::{CompressedImage, RemoteCompressor, TinifyClient};
