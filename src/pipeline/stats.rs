//! Run statistics for `optimize-recording`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Counters collected over one pipeline run.
///
/// Emitted on stderr when the run ends, whether it succeeded or not.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub input: PathBuf,
    pub output: PathBuf,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub frames_extracted: usize,
    pub unique_frames: usize,
    pub duplicate_frames: usize,
    pub dropped_frames: usize,
    pub timeline_entries: usize,
    pub owned_writes: usize,
    pub zero_copy_refs: usize,
    pub copied_refs: usize,
    pub optimizer_iterations: usize,
    pub size_before: u64,
    pub size_after: u64,
    pub elapsed_secs: f64,
}

impl PipelineStats {
    pub fn new(input: PathBuf, output: PathBuf) -> Self {
        Self {
            input,
            output,
            ..Default::default()
        }
    }

    /// Close the record with the run's result and duration.
    pub fn finish<T>(&mut self, result: &anyhow::Result<T>, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs_f64();
        self.success = result.is_ok();
        self.error = result.as_ref().err().map(|e| format!("{:#}", e));
    }

    /// Output size relative to the input, in percent.
    pub fn size_ratio(&self) -> Option<f64> {
        (self.size_before > 0 && self.size_after > 0)
            .then(|| self.size_after as f64 / self.size_before as f64 * 100.0)
    }

    /// Write the record to stderr, as one JSON line or a human summary.
    pub fn emit(&self, json: bool) {
        if json {
            match serde_json::to_string(self) {
                Ok(line) => eprintln!("{}", line),
                Err(e) => tracing::warn!("Failed to serialize stats: {}", e),
            }
        } else {
            eprint!("{}", self);
        }
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "done" } else { "failed" };
        writeln!(
            f,
            "optimize-recording {}: {:?} -> {:?} in {:.1}s",
            status, self.input, self.output, self.elapsed_secs
        )?;
        writeln!(
            f,
            "  frames:   {} extracted, {} unique, {} duplicate, {} dropped",
            self.frames_extracted, self.unique_frames, self.duplicate_frames, self.dropped_frames
        )?;
        writeln!(
            f,
            "  timeline: {} entries, {} owned writes, {} zero-copy refs, {} copied refs",
            self.timeline_entries, self.owned_writes, self.zero_copy_refs, self.copied_refs
        )?;
        if self.optimizer_iterations > 0 {
            writeln!(f, "  optimizer: {} iterations", self.optimizer_iterations)?;
        }
        match self.size_ratio() {
            Some(ratio) => writeln!(
                f,
                "  size:     {} -> {} bytes ({:.1}%)",
                self.size_before, self.size_after, ratio
            )?,
            None => writeln!(f, "  size:     {} bytes in", self.size_before)?,
        }
        if let Some(error) = &self.error {
            writeln!(f, "  error:    {}", error)?;
        }
        Ok(())
    }
}
