//! `extract-unique-frames`: write each distinct frame of a video once.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mediasqueeze_av::{
    pack_animated_webp, probe_video, ExtractOptions, FfmpegExtractor, ToolRegistry, Workspace,
};
use mediasqueeze_frames::{
    FrameFormat, FrameIndex, FrameLayout, FramesMetadata, SourceInfo, ANIMATED_WEBP_FILE,
    METADATA_FILE,
};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::exit::Interrupted;
use crate::pipeline::{PipelineStats, RecordingPipeline};

#[derive(Debug, Clone)]
pub struct ExtractArgs {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub options: ExtractOptions,
    pub layout: FrameLayout,
    pub overwrite: bool,
}

pub async fn run(config: &Config, args: &ExtractArgs, cancel: CancellationToken) -> Result<FramesMetadata> {
    check_output_dir(&args.output_dir, args.overwrite)?;
    if !args.input.is_file() {
        anyhow::bail!("Input file not found: {:?}", args.input);
    }

    let tools = ToolRegistry::discover(&config.tools);
    let info = probe_video(&tools, &args.input, &cancel)
        .await
        .with_context(|| format!("Failed to probe {:?}", args.input))?;
    tracing::info!(
        "{:?}: {}x{}, {:.3} fps, {:.2}s",
        args.input,
        info.width,
        info.height,
        info.fps,
        info.duration
    );

    let extractor = FfmpegExtractor::new(&tools, cancel.clone())?;
    let pipeline = RecordingPipeline::new(&tools, &extractor, cancel.clone());
    let workspace = Workspace::new("frames")?;
    let mut stats = PipelineStats::default();
    let index = pipeline
        .index_frames(&args.input, &args.options, &workspace, &mut stats)
        .await?;
    pipeline.checkpoint()?;

    let source = SourceInfo {
        width: info.width,
        height: info.height,
        fps: info.fps,
        duration: info.duration,
        frame_count: info.frame_count,
    };
    let metadata = save_frames(&tools, &index, source, args, &workspace, &cancel).await?;

    eprintln!(
        "Extracted {} unique frames ({} duplicates, {} dropped) to {:?}",
        metadata.unique_frames.len(),
        metadata.duplicates_count,
        metadata.dropped_frames.len(),
        args.output_dir
    );
    Ok(metadata)
}

/// Stage the unique frames in `workspace`, pack them if asked, then move the
/// result into the output directory.
///
/// The output directory is only touched once everything is staged.
pub async fn save_frames(
    tools: &ToolRegistry,
    index: &FrameIndex,
    source: SourceInfo,
    args: &ExtractArgs,
    workspace: &Workspace,
    cancel: &CancellationToken,
) -> Result<FramesMetadata> {
    let staged = workspace.subdir("staged")?;
    let format = args.options.format;
    let mut metadata = write_unique_frames(index, &staged, source, format, args.options.stride)?;

    if args.layout == FrameLayout::AnimatedWebp {
        pack_animated_webp(
            tools,
            &staged,
            format,
            metadata.unique_frames.len(),
            &staged.join(ANIMATED_WEBP_FILE),
            cancel,
        )
        .await
        .context("Failed to pack unique frames")?;
        metadata.layout = FrameLayout::AnimatedWebp;
        metadata.save(&staged)?;
    }

    if cancel.is_cancelled() {
        return Err(Interrupted.into());
    }
    publish(&staged, &metadata, &args.output_dir)?;
    Ok(metadata)
}

/// Copy each unique frame into `out_dir` and write `metadata.json` next to them.
pub fn write_unique_frames(
    index: &FrameIndex,
    out_dir: &Path,
    source: SourceInfo,
    format: FrameFormat,
    stride: u32,
) -> Result<FramesMetadata> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;

    for unique in index.uniques() {
        let target = out_dir.join(FramesMetadata::frame_file_name(unique.id, format));
        std::fs::copy(&unique.frame.source, &target)
            .with_context(|| format!("Failed to write {:?}", target))?;
    }

    let metadata = FramesMetadata::from_index(index, source, format, stride);
    let path = metadata.save(out_dir)?;
    tracing::debug!("Wrote {:?}", path);
    Ok(metadata)
}

/// Move the files `metadata` names from `staged` into `out_dir`.
///
/// Earlier results are cleared first and `metadata.json` moves last, so an
/// interrupted move never leaves a directory that loads.
fn publish(staged: &Path, metadata: &FramesMetadata, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;
    clear_previous_frames(out_dir)?;

    let mut names: Vec<&str> = match metadata.layout {
        FrameLayout::Files => metadata.unique_frames.iter().map(|e| e.file.as_str()).collect(),
        FrameLayout::AnimatedWebp => vec![ANIMATED_WEBP_FILE],
    };
    names.push(METADATA_FILE);

    for name in names {
        let from = staged.join(name);
        let to = out_dir.join(name);
        if let Err(e) = std::fs::rename(&from, &to) {
            tracing::debug!("Rename failed ({}), copying to {:?}", e, to);
            std::fs::copy(&from, &to).with_context(|| format!("Failed to write {:?}", to))?;
        }
    }
    tracing::debug!("Published {} frames to {:?}", metadata.unique_frames.len(), out_dir);
    Ok(())
}

/// Refuse a non-empty directory unless overwriting.
fn check_output_dir(dir: &Path, overwrite: bool) -> Result<()> {
    let Ok(mut entries) = std::fs::read_dir(dir) else {
        return Ok(());
    };
    if entries.next().is_some() && !overwrite {
        anyhow::bail!(
            "Output directory is not empty: {:?} (use --overwrite to replace its frames)",
            dir
        );
    }
    Ok(())
}

/// Remove the frames and metadata of an earlier extraction, leaving other files.
fn clear_previous_frames(dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)?.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().to_string();
        if name == METADATA_FILE || name == ANIMATED_WEBP_FILE || name.starts_with("frame_") {
            std::fs::remove_file(entry.path())
                .with_context(|| format!("Failed to remove {:?}", entry.path()))?;
        }
    }
    Ok(())
}
