//! `reassemble-video`: rebuild a video from extracted unique frames.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mediasqueeze_av::{mux, EncodeParams, ToolRegistry, Workspace};
use mediasqueeze_frames::{FramesMetadata, LinkStrategy, MaterializedTimeline, TimelineMode};
use tokio_util::sync::CancellationToken;

use super::ensure_writable;
use crate::config::Config;
use crate::pipeline::build_timeline;

#[derive(Debug, Clone)]
pub struct ReassembleArgs {
    /// Directory holding `metadata.json` and the frame files.
    pub frames_dir: PathBuf,
    pub output: PathBuf,
    pub audio: Option<PathBuf>,
    pub encode: EncodeParams,
    pub mode: TimelineMode,
    pub link_strategy: LinkStrategy,
    pub overwrite: bool,
}

pub async fn run(config: &Config, args: &ReassembleArgs, cancel: CancellationToken) -> Result<PathBuf> {
    ensure_writable(&args.output, args.overwrite)?;
    if let Some(audio) = &args.audio {
        if !audio.is_file() {
            anyhow::bail!("Audio file not found: {:?}", audio);
        }
    }

    let tools = ToolRegistry::discover(&config.tools);
    let workspace = Workspace::for_destination(&args.output)?;
    let timeline = plan_from_dir(
        &args.frames_dir,
        args.mode,
        args.link_strategy,
        &workspace.subdir("unpacked")?,
        &workspace.subdir("timeline")?,
    )?;
    let stats = timeline.stats();

    mux(
        &tools,
        timeline,
        args.audio.as_deref(),
        &args.encode,
        &workspace.output(),
        &cancel,
    )
    .await
    .context("Failed to encode output video")?;

    let output = workspace
        .finalize(&args.output)
        .with_context(|| format!("Failed to move output to {:?}", args.output))?;

    eprintln!(
        "Reassembled {:?} ({} owned frames, {} linked, {} copied)",
        output, stats.owned_writes, stats.zero_copy_refs, stats.copied_refs
    );
    Ok(output)
}

/// Load `metadata.json` from `frames_dir` and materialize its timeline into `out_dir`.
///
/// Packed frames are unpacked into `scratch` first.
pub fn plan_from_dir(
    frames_dir: &Path,
    mode: TimelineMode,
    link_strategy: LinkStrategy,
    scratch: &Path,
    out_dir: &Path,
) -> Result<MaterializedTimeline> {
    let metadata = FramesMetadata::load(frames_dir)
        .with_context(|| format!("Failed to load frame metadata from {:?}", frames_dir))?;
    let uniques = metadata.resolve_frames(frames_dir, scratch)?;
    tracing::info!(
        "Loaded {} unique frames ({:.2}s source, {}, {})",
        uniques.len(),
        metadata.source.duration,
        metadata.frame_format,
        metadata.layout
    );
    build_timeline(
        &uniques,
        metadata.timing(),
        mode,
        metadata.frame_format,
        link_strategy,
        out_dir,
    )
}
