//! Size-target optimizer.
//!
//! The decision logic is a pure state machine: [`step`] takes the current
//! [`OptimizerState`] and the result of one attempt and returns the next state
//! together with a [`Decision`]. [`runner::SizeOptimizer`] drives it against a
//! real [`SizeReducer`](mediasqueeze_av::SizeReducer).
//!
//! The first attempt asks the encoder for the target size directly. If that
//! misses, the optimizer escalates: it asks for a 2% reduction of the current
//! file, drops back to 1% after every successful attempt and adds one point
//! after every attempt that made no progress. Escalation gives up once the
//! next request would exceed [`MAX_PERCENT`].

pub mod runner;

use serde::Serialize;

pub use runner::SizeOptimizer;

/// First percentage requested after the direct attempt misses.
pub const ESCALATION_START_PERCENT: u32 = 2;
/// Percentage requested after an attempt that made progress.
pub const RESET_PERCENT: u32 = 1;
/// Largest reduction ever requested in one attempt.
pub const MAX_PERCENT: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Direct,
    Escalating,
}

/// What an attempt asked the encoder for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeRequest {
    ToSize(u64),
    ByPercent(u32),
}

/// One invocation of the size reducer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressionAttempt {
    /// 1-based attempt number.
    pub iteration: u32,
    pub request: SizeRequest,
    pub resulting_size_bytes: u64,
    pub made_progress: bool,
}

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The file is at or below the target.
    Reached,
    /// `max_iterations` attempts were used.
    IterationLimit,
    /// The next escalation step would exceed [`MAX_PERCENT`].
    Stalled,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Reached)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReduceToSize(u64),
    ReduceByPercent(u32),
    Stop(Outcome),
}

impl Action {
    /// The request this action issues, or `None` for [`Action::Stop`].
    pub fn request(&self) -> Option<SizeRequest> {
        match *self {
            Action::ReduceToSize(bytes) => Some(SizeRequest::ToSize(bytes)),
            Action::ReduceByPercent(percent) => Some(SizeRequest::ByPercent(percent)),
            Action::Stop(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Replace the working file with the attempt's output.
    pub commit: bool,
    pub next: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerState {
    pub phase: Phase,
    /// Percentage of the last escalation request; 0 before escalation.
    pub percent: u32,
    pub iterations_used: u32,
    /// Size of the last committed working file.
    pub current_size: u64,
    pub target: u64,
    pub max_iterations: u32,
}

impl OptimizerState {
    pub fn new(initial_size: u64, target: u64, max_iterations: u32) -> anyhow::Result<Self> {
        if max_iterations == 0 {
            anyhow::bail!("max_iterations must be at least 1");
        }
        Ok(Self {
            phase: Phase::Direct,
            percent: 0,
            iterations_used: 0,
            current_size: initial_size,
            target,
            max_iterations,
        })
    }

    /// The direct attempt always runs, even when the file already fits.
    pub fn first_action(&self) -> Action {
        Action::ReduceToSize(self.target)
    }

    /// Build the record for an attempt that produced `resulting_size` bytes.
    pub fn record(&self, request: SizeRequest, resulting_size: u64) -> CompressionAttempt {
        CompressionAttempt {
            iteration: self.iterations_used + 1,
            request,
            resulting_size_bytes: resulting_size,
            made_progress: resulting_size < self.current_size,
        }
    }
}

/// Advance the optimizer by one attempt.
pub fn step(mut state: OptimizerState, attempt: &CompressionAttempt) -> (OptimizerState, Decision) {
    state.iterations_used += 1;

    let commit = attempt.made_progress;
    if commit {
        state.current_size = attempt.resulting_size_bytes;
    }

    let stop = |state: OptimizerState, outcome| {
        (
            state,
            Decision {
                commit,
                next: Action::Stop(outcome),
            },
        )
    };

    if state.current_size <= state.target {
        return stop(state, Outcome::Reached);
    }

    let next_percent = match state.phase {
        Phase::Direct => ESCALATION_START_PERCENT,
        Phase::Escalating if commit => RESET_PERCENT,
        Phase::Escalating => state.percent + 1,
    };
    state.phase = Phase::Escalating;

    if next_percent > MAX_PERCENT {
        return stop(state, Outcome::Stalled);
    }
    state.percent = next_percent;

    if state.iterations_used >= state.max_iterations {
        return stop(state, Outcome::IterationLimit);
    }

    (
        state,
        Decision {
            commit,
            next: Action::ReduceByPercent(next_percent),
        },
    )
}

/// Result of one optimizer run.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub outcome: Outcome,
    pub attempts: Vec<CompressionAttempt>,
    pub initial_size: u64,
    pub final_size: u64,
    pub target: u64,
    /// Bytes still above the target; 0 on success.
    pub shortfall_bytes: u64,
}

impl OptimizationReport {
    pub fn iterations(&self) -> usize {
        self.attempts.len()
    }

    /// Reduction relative to the input, in percent.
    pub fn reduction_percent(&self) -> f64 {
        if self.initial_size == 0 {
            return 0.0;
        }
        (1.0 - self.final_size as f64 / self.initial_size as f64) * 100.0
    }
}
