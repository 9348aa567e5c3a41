//! The `optimize-recording` pipeline.
//!
//! probe -> extract -> fingerprint -> classify -> compress unique frames ->
//! plan -> materialize -> mux -> move into place.

pub mod stats;

pub use stats::PipelineStats;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mediasqueeze_av::{
    mux, probe_video, EncodeParams, ExtractOptions, FrameExtractor, Jpegoptim, RemoteCompressor,
    TinifyClient, ToolRegistry, Workspace,
};
use mediasqueeze_frames::{
    fingerprint, materialize, FrameFormat, FrameIndex, LinkStrategy, MaterializedTimeline,
    SourceTiming, Timeline, TimelineMode, UniqueFrame,
};
use tokio_util::sync::CancellationToken;

use crate::exit::Interrupted;
use crate::optimizer::SizeOptimizer;

/// How unique frames are compressed before reassembly.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameCompression {
    None,
    /// Reduce each frame towards `target_bytes` with jpegoptim.
    Jpegoptim { target_bytes: u64, max_iterations: u32 },
    /// Send each frame through the Tinify API.
    Tinify { api_key: String, base_url: String },
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Audio source; defaults to the input's own audio track.
    pub audio: Option<PathBuf>,
    pub extract: ExtractOptions,
    pub mode: TimelineMode,
    pub link_strategy: LinkStrategy,
    pub encode: EncodeParams,
    pub compression: FrameCompression,
    pub overwrite: bool,
}

/// Runs `optimize-recording` against a set of tools.
pub struct RecordingPipeline<'a> {
    tools: &'a ToolRegistry,
    extractor: &'a dyn FrameExtractor,
    cancel: CancellationToken,
}

impl<'a> RecordingPipeline<'a> {
    pub fn new(
        tools: &'a ToolRegistry,
        extractor: &'a dyn FrameExtractor,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tools,
            extractor,
            cancel,
        }
    }

    pub(crate) fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Interrupted.into());
        }
        Ok(())
    }

    /// Run the whole pipeline, filling `stats` as stages complete.
    pub async fn run(&self, opts: &PipelineOptions, stats: &mut PipelineStats) -> Result<PathBuf> {
        ensure_writable(&opts.output, opts.overwrite)?;
        if !opts.input.is_file() {
            anyhow::bail!("Input file not found: {:?}", opts.input);
        }
        if opts.audio.as_deref().is_some_and(|a| !a.is_file()) {
            anyhow::bail!("Audio file not found: {:?}", opts.audio);
        }
        if matches!(opts.compression, FrameCompression::Jpegoptim { .. })
            && opts.extract.format != FrameFormat::Jpg
        {
            anyhow::bail!("jpegoptim frame compression requires --format jpg");
        }
        stats.size_before = std::fs::metadata(&opts.input)?.len();

        tracing::info!("[1/6] Probing {:?}", opts.input);
        let info = probe_video(self.tools, &opts.input, &self.cancel)
            .await
            .with_context(|| format!("Failed to probe {:?}", opts.input))?;
        let timing = SourceTiming::new(info.duration, info.fps);
        self.checkpoint()?;

        let workspace = Workspace::for_destination(&opts.output)?;

        tracing::info!("[2/6] Extracting and indexing frames");
        let index = self
            .index_frames(&opts.input, &opts.extract, &workspace, stats)
            .await?;
        self.checkpoint()?;

        tracing::info!("[3/6] Compressing {} unique frames", index.uniques().len());
        stats.optimizer_iterations = self
            .compress_uniques(&index, &opts.compression)
            .await
            .context("Failed to compress unique frames")?;
        self.checkpoint()?;

        tracing::info!("[4/6] Planning {} timeline", opts.mode);
        let timeline = build_timeline(
            index.uniques(),
            timing,
            opts.mode,
            opts.extract.format,
            opts.link_strategy,
            &workspace.subdir("timeline")?,
        )?;
        record_timeline(&timeline, stats);
        self.checkpoint()?;

        let audio = match &opts.audio {
            Some(audio) => Some(audio.as_path()),
            None if info.has_audio => Some(opts.input.as_path()),
            None => None,
        };

        tracing::info!("[5/6] Encoding");
        mux(
            self.tools,
            timeline,
            audio,
            &opts.encode,
            &workspace.output(),
            &self.cancel,
        )
        .await
        .context("Failed to encode output video")?;
        stats.size_after = std::fs::metadata(workspace.output())?.len();
        self.checkpoint()?;

        tracing::info!("[6/6] Finalizing {:?}", opts.output);
        let output = workspace
            .finalize(&opts.output)
            .with_context(|| format!("Failed to move output to {:?}", opts.output))?;
        Ok(output)
    }

    /// Extract frames into the workspace and classify them.
    pub async fn index_frames(
        &self,
        input: &Path,
        options: &ExtractOptions,
        workspace: &Workspace,
        stats: &mut PipelineStats,
    ) -> Result<FrameIndex> {
        let raw_dir = workspace.subdir("raw")?;
        let frames = self
            .extractor
            .extract(input, options, &raw_dir)
            .await
            .with_context(|| format!("Failed to extract frames from {:?}", input))?;
        stats.frames_extracted = frames.len();
        self.checkpoint()?;

        let fingerprinted = tokio::task::spawn_blocking(move || fingerprint::fingerprint_all(frames))
            .await
            .context("Fingerprinting task failed")?;
        let index = FrameIndex::build(fingerprinted);

        stats.unique_frames = index.uniques().len();
        stats.duplicate_frames = index.duplicates().len();
        stats.dropped_frames = index.dropped().len();

        if index.uniques().is_empty() {
            anyhow::bail!("None of the {} extracted frames could be decoded", stats.frames_extracted);
        }

        tracing::info!(
            "{} frames: {} unique, {} duplicate, {} dropped",
            index.frame_count(),
            stats.unique_frames,
            stats.duplicate_frames,
            stats.dropped_frames
        );
        Ok(index)
    }

    /// Compress each unique frame in place. Returns the optimizer iterations used.
    async fn compress_uniques(
        &self,
        index: &FrameIndex,
        compression: &FrameCompression,
    ) -> Result<usize> {
        match compression {
            FrameCompression::None => Ok(0),
            FrameCompression::Jpegoptim {
                target_bytes,
                max_iterations,
            } => {
                self.tools.verify_version("jpegoptim").await?;
                let reducer = Jpegoptim::new(self.tools, self.cancel.clone())?;
                let optimizer = SizeOptimizer::new(&reducer, self.cancel.clone());
                let mut iterations = 0;
                for unique in index.uniques() {
                    let report = optimizer
                        .optimize(&unique.frame.source, *target_bytes, *max_iterations)
                        .await
                        .with_context(|| format!("Unique frame #{}", unique.id))?;
                    if !report.outcome.is_success() {
                        tracing::warn!(
                            "Frame #{} stayed {} bytes above target ({:?})",
                            unique.id,
                            report.shortfall_bytes,
                            report.outcome
                        );
                    }
                    iterations += report.iterations();
                }
                Ok(iterations)
            }
            FrameCompression::Tinify { api_key, base_url } => {
                let client = TinifyClient::with_base_url(api_key.as_str(), base_url.as_str());
                for unique in index.uniques() {
                    self.checkpoint()?;
                    compress_frame_remote(&client, unique).await?;
                }
                Ok(0)
            }
        }
    }
}

async fn compress_frame_remote(client: &dyn RemoteCompressor, unique: &UniqueFrame) -> Result<()> {
    let path = &unique.frame.source;
    let original = tokio::fs::read(path).await?;
    let before = original.len();
    let compressed = client
        .compress(original)
        .await
        .with_context(|| format!("Unique frame #{}", unique.id))?;
    if compressed.bytes.len() < before {
        tokio::fs::write(path, &compressed.bytes).await?;
    }
    tracing::debug!(
        "Frame #{}: {} -> {} bytes",
        unique.id,
        before,
        compressed.bytes.len().min(before)
    );
    Ok(())
}

/// Plan a timeline over `uniques` and write it to `out_dir` for the muxer.
pub fn build_timeline(
    uniques: &[UniqueFrame],
    timing: SourceTiming,
    mode: TimelineMode,
    format: FrameFormat,
    link_strategy: LinkStrategy,
    out_dir: &Path,
) -> Result<MaterializedTimeline> {
    let timeline = Timeline::plan(uniques, timing, mode).context("Failed to plan timeline")?;
    tracing::debug!(
        "{} timeline: {} entries over {:.2}s",
        mode,
        timeline.len(),
        timeline.duration()
    );
    let linker = link_strategy.linker();
    let materialized = materialize(timeline, uniques, out_dir, format, linker.as_ref())
        .context("Failed to materialize timeline")?;
    Ok(materialized)
}

fn record_timeline(timeline: &MaterializedTimeline, stats: &mut PipelineStats) {
    let materialize_stats = timeline.stats();
    stats.timeline_entries = match timeline {
        MaterializedTimeline::Variable { entries, .. } => *entries,
        MaterializedTimeline::Constant { slots, .. } => *slots,
    };
    stats.owned_writes = materialize_stats.owned_writes;
    stats.zero_copy_refs = materialize_stats.zero_copy_refs;
    stats.copied_refs = materialize_stats.copied_refs;
}

/// Refuse to touch an existing output unless overwriting was requested.
pub fn ensure_writable(output: &Path, overwrite: bool) -> Result<()> {
    if output.exists() && !overwrite {
        anyhow::bail!(
            "Output already exists: {:?} (use --overwrite to replace it)",
            output
        );
    }
    Ok(())
}
