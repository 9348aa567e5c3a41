//! Materialization of planned timelines.
//!
//! A [`Timeline`] is consumed here and turned into files the muxer can read.
//! Only the resulting [`MaterializedTimeline`] is accepted by the muxer, so a
//! timeline whose materialization failed can never be handed off.

use crate::{Error, FrameFormat, LinkOrCopy, Result, Timeline, UniqueFrame};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Name of the concat list written for variable-rate timelines.
pub const CONCAT_LIST_FILE: &str = "concat.txt";

/// Byte accounting for a materialized timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    /// Slots whose bytes were written (one per unique frame used).
    pub owned_writes: usize,
    /// Slots that share storage with an owned write.
    pub zero_copy_refs: usize,
    /// Slots the linker had to fill with a byte copy.
    pub copied_refs: usize,
}

impl MaterializeStats {
    /// Total number of slots.
    pub fn slots(&self) -> usize {
        self.owned_writes + self.zero_copy_refs + self.copied_refs
    }
}

/// A timeline written to disk and ready for muxing.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterializedTimeline {
    /// An ffmpeg concat list pointing at the unique frame files.
    Variable {
        concat_list: PathBuf,
        entries: usize,
        duration: f64,
    },
    /// A numbered image sequence, one file per tick.
    Constant {
        /// printf-style pattern (`frame_%08d.<ext>`).
        pattern: PathBuf,
        tick_rate: f64,
        slots: usize,
        stats: MaterializeStats,
    },
}

impl MaterializedTimeline {
    pub fn stats(&self) -> MaterializeStats {
        match self {
            MaterializedTimeline::Variable { .. } => MaterializeStats::default(),
            MaterializedTimeline::Constant { stats, .. } => *stats,
        }
    }

    /// Output duration in seconds.
    pub fn duration(&self) -> f64 {
        match self {
            MaterializedTimeline::Variable { duration, .. } => *duration,
            MaterializedTimeline::Constant {
                tick_rate, slots, ..
            } => *slots as f64 / tick_rate,
        }
    }
}

/// Slot file name for constant-rate tick `slot`.
pub fn slot_file_name(slot: usize, format: FrameFormat) -> String {
    format!("frame_{slot:08}.{}", format.extension())
}

/// Write `timeline` into `out_dir`.
///
/// Variable-rate timelines produce a concat list referencing the unique frame
/// files in place. Constant-rate timelines produce one file per tick: the
/// first tick showing a unique frame gets a copy of its bytes and every later
/// tick showing the same frame is created with `linker`. Any failure aborts
/// the whole operation.
pub fn materialize(
    timeline: Timeline,
    uniques: &[UniqueFrame],
    out_dir: &Path,
    format: FrameFormat,
    linker: &dyn LinkOrCopy,
) -> Result<MaterializedTimeline> {
    std::fs::create_dir_all(out_dir)?;
    let by_id: HashMap<usize, &UniqueFrame> = uniques.iter().map(|u| (u.id, u)).collect();
    let lookup = |id: usize| {
        by_id
            .get(&id)
            .copied()
            .ok_or_else(|| Error::invalid_timeline(format!("no unique frame with id {id}")))
    };

    match timeline {
        Timeline::Variable(variable) => {
            let mut list = String::from("ffconcat version 1.0\n");
            let mut last = None;
            for entry in variable.entries() {
                let path = std::fs::canonicalize(&lookup(entry.unique_id)?.frame.source)?;
                list.push_str(&format!("file '{}'\n", escape_concat_path(&path)));
                list.push_str(&format!("duration {:.6}\n", entry.hold));
                last = Some(path);
            }
            // The concat demuxer ignores the last duration unless the file is repeated.
            if let Some(path) = last {
                list.push_str(&format!("file '{}'\n", escape_concat_path(&path)));
            }

            let concat_list = out_dir.join(CONCAT_LIST_FILE);
            std::fs::write(&concat_list, list)?;
            tracing::debug!(
                "Wrote concat list with {} entries to {:?}",
                variable.len(),
                concat_list
            );

            Ok(MaterializedTimeline::Variable {
                concat_list,
                entries: variable.len(),
                duration: variable.total_duration(),
            })
        }
        Timeline::Constant(constant) => {
            let mut stats = MaterializeStats::default();
            let mut owners: HashMap<usize, PathBuf> = HashMap::new();

            for (slot, &unique_id) in constant.slots().iter().enumerate() {
                let target = out_dir.join(slot_file_name(slot, format));
                let fail = |source| Error::Materialization {
                    slot,
                    target: target.clone(),
                    source,
                };

                match owners.get(&unique_id) {
                    Some(owner) => {
                        let kind = linker.link_or_copy(owner, &target).map_err(fail)?;
                        if kind.is_zero_copy() {
                            stats.zero_copy_refs += 1;
                        } else {
                            stats.copied_refs += 1;
                        }
                    }
                    None => {
                        let unique = lookup(unique_id)?;
                        std::fs::copy(&unique.frame.source, &target).map_err(fail)?;
                        stats.owned_writes += 1;
                        owners.insert(unique_id, target);
                    }
                }
            }

            tracing::debug!(
                "Materialized {} ticks at {} fps: {} owned, {} linked, {} copied",
                constant.len(),
                constant.tick_rate(),
                stats.owned_writes,
                stats.zero_copy_refs,
                stats.copied_refs
            );

            Ok(MaterializedTimeline::Constant {
                pattern: out_dir.join(format!("frame_%08d.{}", format.extension())),
                tick_rate: constant.tick_rate(),
                slots: constant.len(),
                stats,
            })
        }
    }
}

/// Quote a path for a single-quoted concat `file` directive.
fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}
