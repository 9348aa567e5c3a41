//! # mediasqueeze-frames
//!
//! Frame identity indexing and timeline reassembly for deduplicated video.
//!
//! This crate provides:
//!
//! - **Fingerprinting** ([`fingerprint`]) -- exact content hashes over decoded
//!   pixels, computed in parallel across frames.
//! - **Frame identity index** ([`FrameIndex`]) -- a single forward pass that
//!   splits an ordered frame sequence into unique frames and duplicate
//!   back-references, comparing only against the most recent unique frame.
//! - **Timeline planning** ([`VariableTimeline`], [`ConstantTimeline`]) --
//!   one entry per unique frame with a hold duration, or one slot per
//!   constant-rate tick.
//! - **Materialization** ([`materialize`]) -- writes a planned timeline to disk
//!   for the muxer, using filesystem links ([`LinkOrCopy`]) for repeated slots.
//! - **Metadata** ([`FramesMetadata`]) -- the `metadata.json` written next to
//!   extracted frames, which are stored as files or packed into one animated
//!   WebP ([`FrameLayout`]).
//!
//! ## Example
//!
//! ```no_run
//! use mediasqueeze_frames::{fingerprint, FrameIndex, SourceTiming, VariableTimeline};
//! # fn frames() -> Vec<mediasqueeze_frames::ExtractedFrame> { Vec::new() }
//!
//! let fingerprinted = fingerprint::fingerprint_all(frames());
//! let index = FrameIndex::build(fingerprinted);
//! let timeline = VariableTimeline::plan(index.uniques(), SourceTiming::new(12.0, 25.0))?;
//! println!("{} entries, {:.2}s", timeline.len(), timeline.total_duration());
//! # Ok::<(), mediasqueeze_frames::Error>(())
//! ```

mod error;
mod frame;
pub mod fingerprint;
pub mod index;
pub mod link;
pub mod materialize;
pub mod metadata;
pub mod packed;
pub mod timeline;

pub use error::{Error, Result};
pub use frame::{ExtractedFrame, Fingerprint, Frame, FrameFormat};
pub use index::{Classification, Classifier, DroppedFrame, DuplicateReference, FrameIndex, UniqueFrame};
pub use link::{LinkKind, LinkOrCopy, LinkStrategy};
pub use materialize::{materialize, MaterializeStats, MaterializedTimeline};
pub use metadata::{FramesMetadata, SourceInfo, METADATA_FILE};
pub use packed::{unpack_animated_webp, FrameLayout, ANIMATED_WEBP_FILE};
pub use timeline::{
    ConstantTimeline, SourceTiming, Timeline, TimelineMode, VariableEntry, VariableTimeline,
};
