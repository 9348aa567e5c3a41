//! Timeline planning.
//!
//! Two reconstruction models are supported:
//!
//! - [`VariableTimeline`]: one entry per unique frame with an explicit hold
//!   duration. Produces the fewest encoded frames.
//! - [`ConstantTimeline`]: one slot per tick of a fixed output rate, each slot
//!   bound to the unique frame showing at that tick.
//!
//! The first variable entry is anchored at `0.0` so the holds cover the whole
//! source span without a gap before the first detected frame.

use crate::{Error, Result, UniqueFrame};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hold used for the last frame when neither duration nor frame rate is usable.
const FALLBACK_LAST_HOLD_SECS: f64 = 2.0;

/// Timing of the source video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceTiming {
    /// Total duration in seconds.
    pub duration: f64,
    /// Source frame rate; used to size the last hold when the duration is short.
    pub fps: f64,
}

impl SourceTiming {
    pub fn new(duration: f64, fps: f64) -> Self {
        Self { duration, fps }
    }

    fn frame_interval(&self) -> f64 {
        if self.fps > 0.0 {
            1.0 / self.fps
        } else {
            FALLBACK_LAST_HOLD_SECS
        }
    }
}

/// Reconstruction mode.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TimelineMode {
    /// Variable frame rate: exact durations, minimum frame count.
    #[default]
    Vfr,
    /// Constant frame rate at the given tick rate.
    Cfr { fps: f64 },
}

impl fmt::Display for TimelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineMode::Vfr => f.write_str("vfr"),
            TimelineMode::Cfr { fps } => write!(f, "cfr@{fps}"),
        }
    }
}

/// One variable-rate entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VariableEntry {
    pub unique_id: usize,
    pub start: f64,
    pub hold: f64,
}

/// Variable-rate timeline: one entry per unique frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableTimeline {
    entries: Vec<VariableEntry>,
}

impl VariableTimeline {
    /// Plan a variable-rate timeline from unique frames in temporal order.
    ///
    /// `hold = start(next) - start(this)`; the last hold runs to the end of the
    /// source, or one source frame interval if the source ends before it.
    pub fn plan(uniques: &[UniqueFrame], timing: SourceTiming) -> Result<Self> {
        if uniques.is_empty() {
            return Err(Error::EmptyTimeline);
        }

        for pair in uniques.windows(2) {
            if pair[1].timestamp() < pair[0].timestamp() {
                return Err(Error::invalid_timeline(format!(
                    "unique frame {} at {:.3}s precedes frame {} at {:.3}s",
                    pair[1].id,
                    pair[1].timestamp(),
                    pair[0].id,
                    pair[0].timestamp()
                )));
            }
        }

        let mut entries = Vec::with_capacity(uniques.len());
        for (i, unique) in uniques.iter().enumerate() {
            let start = if i == 0 { 0.0 } else { unique.timestamp() };
            let hold = match uniques.get(i + 1) {
                Some(next) => next.timestamp() - start,
                None => {
                    let remaining = timing.duration - start;
                    if remaining > 0.0 {
                        remaining
                    } else {
                        timing.frame_interval()
                    }
                }
            };
            entries.push(VariableEntry {
                unique_id: unique.id,
                start,
                hold,
            });
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[VariableEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all holds.
    pub fn total_duration(&self) -> f64 {
        self.entries.iter().map(|e| e.hold).sum()
    }

    /// The unique frame showing at time `t` (clamped to the first entry).
    pub fn resolve(&self, t: f64) -> usize {
        let after = self.entries.partition_point(|e| e.start <= t);
        self.entries[after.saturating_sub(1)].unique_id
    }
}

/// Constant-rate timeline: one slot per output tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantTimeline {
    tick_rate: f64,
    slots: Vec<usize>,
}

impl ConstantTimeline {
    /// Number of ticks for a duration at a rate: `duration * rate` rounded half
    /// up, and at least one.
    pub fn tick_count(duration: f64, tick_rate: f64) -> usize {
        let ticks = (duration * tick_rate + 0.5).floor();
        if ticks.is_finite() && ticks >= 1.0 {
            ticks as usize
        } else {
            1
        }
    }

    /// Plan a constant-rate timeline at `tick_rate` ticks per second.
    pub fn plan(uniques: &[UniqueFrame], timing: SourceTiming, tick_rate: f64) -> Result<Self> {
        if !(tick_rate.is_finite() && tick_rate > 0.0) {
            return Err(Error::invalid_timeline(format!(
                "tick rate must be positive, got {tick_rate}"
            )));
        }

        let variable = VariableTimeline::plan(uniques, timing)?;
        // The source duration bounds the output; uniques starting at or past it get no tick.
        let span = if timing.duration.is_finite() && timing.duration > 0.0 {
            timing.duration
        } else {
            variable.total_duration()
        };
        let ticks = Self::tick_count(span, tick_rate);
        let slots = (0..ticks)
            .map(|i| variable.resolve(i as f64 / tick_rate))
            .collect();

        Ok(Self { tick_rate, slots })
    }

    pub fn tick_rate(&self) -> f64 {
        self.tick_rate
    }

    /// Unique frame id for each tick, in tick order.
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.slots.len() as f64 / self.tick_rate
    }
}

/// A planned timeline in either model.
#[derive(Debug, Clone, PartialEq)]
pub enum Timeline {
    Variable(VariableTimeline),
    Constant(ConstantTimeline),
}

impl Timeline {
    /// Plan a timeline in the requested mode.
    pub fn plan(uniques: &[UniqueFrame], timing: SourceTiming, mode: TimelineMode) -> Result<Self> {
        match mode {
            TimelineMode::Vfr => VariableTimeline::plan(uniques, timing).map(Timeline::Variable),
            TimelineMode::Cfr { fps } => {
                ConstantTimeline::plan(uniques, timing, fps).map(Timeline::Constant)
            }
        }
    }

    /// Number of output entries (variable entries or constant ticks).
    pub fn len(&self) -> usize {
        match self {
            Timeline::Variable(t) => t.len(),
            Timeline::Constant(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f64 {
        match self {
            Timeline::Variable(t) => t.total_duration(),
            Timeline::Constant(t) => t.duration(),
        }
    }
}

impl FromStr for TimelineMode {
    type Err = String;

    /// Parses `vfr`, `cfr` (25 fps) or `cfr@<fps>`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        match lower.split_once('@') {
            None if lower == "vfr" => Ok(TimelineMode::Vfr),
            None if lower == "cfr" => Ok(TimelineMode::Cfr { fps: 25.0 }),
            Some(("cfr", fps)) => fps
                .parse::<f64>()
                .map(|fps| TimelineMode::Cfr { fps })
                .map_err(|e| format!("Invalid CFR rate {fps:?}: {e}")),
            _ => Err(format!("Unknown timeline mode: {}", s)),
        }
    }
}
