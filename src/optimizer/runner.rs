//! Drives the optimizer state machine against a real size reducer.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mediasqueeze_av::SizeReducer;
use tokio_util::sync::CancellationToken;

use super::{step, Action, OptimizationReport, OptimizerState, SizeRequest};
use crate::exit::Interrupted;

/// Runs size reduction attempts on a working file until the target is met.
///
/// Each attempt works on a copy of the working file placed next to it; the
/// copy replaces the working file only when it is smaller.
pub struct SizeOptimizer<'a, R: SizeReducer + ?Sized> {
    reducer: &'a R,
    cancel: CancellationToken,
}

impl<'a, R: SizeReducer + ?Sized> SizeOptimizer<'a, R> {
    pub fn new(reducer: &'a R, cancel: CancellationToken) -> Self {
        Self { reducer, cancel }
    }

    /// Reduce `working` in place towards `target` bytes.
    ///
    /// Missing the target is reported through the outcome, not as an error.
    pub async fn optimize(
        &self,
        working: &Path,
        target: u64,
        max_iterations: u32,
    ) -> Result<OptimizationReport> {
        let initial_size = tokio::fs::metadata(working)
            .await
            .with_context(|| format!("Failed to read {:?}", working))?
            .len();

        let mut state = OptimizerState::new(initial_size, target, max_iterations)?;
        let mut action = state.first_action();
        let mut attempts = Vec::new();
        let scratch = attempt_path(working);

        tracing::debug!(
            "Optimizing {:?}: {} bytes, target {} bytes, at most {} attempts",
            working,
            initial_size,
            target,
            max_iterations
        );

        let outcome = loop {
            let request = match action {
                Action::Stop(outcome) => break outcome,
                Action::ReduceToSize(bytes) => SizeRequest::ToSize(bytes),
                Action::ReduceByPercent(percent) => SizeRequest::ByPercent(percent),
            };

            if self.cancel.is_cancelled() {
                return Err(Interrupted.into());
            }

            tokio::fs::copy(working, &scratch)
                .await
                .with_context(|| format!("Failed to copy {:?} for an attempt", working))?;

            let result = match request {
                SizeRequest::ToSize(bytes) => {
                    self.reducer.reduce_to_size(&scratch, bytes).await
                }
                SizeRequest::ByPercent(percent) => {
                    self.reducer.reduce_by_percent(&scratch, percent).await
                }
            };
            let size = match result {
                Ok(size) => size,
                Err(e) => {
                    discard(&scratch).await;
                    if e.is_cancelled() {
                        return Err(anyhow::Error::new(e).context(Interrupted));
                    }
                    return Err(e).with_context(|| {
                        format!("Attempt {} on {:?} failed", state.iterations_used + 1, working)
                    });
                }
            };

            let attempt = state.record(request, size);
            let (next, decision) = step(state, &attempt);

            if decision.commit {
                tokio::fs::rename(&scratch, working)
                    .await
                    .with_context(|| format!("Failed to commit attempt to {:?}", working))?;
            } else {
                discard(&scratch).await;
            }

            tracing::info!(
                "Attempt {}: {:?} -> {} bytes{}",
                attempt.iteration,
                attempt.request,
                attempt.resulting_size_bytes,
                if decision.commit { "" } else { " (no progress)" }
            );

            attempts.push(attempt);
            state = next;
            action = decision.next;
        };

        let final_size = state.current_size;
        Ok(OptimizationReport {
            outcome,
            attempts,
            initial_size,
            final_size,
            target,
            shortfall_bytes: final_size.saturating_sub(target),
        })
    }
}

fn attempt_path(working: &Path) -> PathBuf {
    let name = working
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "working".to_string());
    working.with_file_name(format!(".{name}.attempt"))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove attempt file {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::exit::{exit_code, INTERRUPTED};
    use crate::optimizer::Outcome;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Rewrites the file to a size computed from the request and current size.
    pub(crate) struct ScriptedReducer<F> {
        size_for: Mutex<F>,
        pub calls: Mutex<Vec<SizeRequest>>,
    }

    impl<F> ScriptedReducer<F>
    where
        F: FnMut(SizeRequest, u64) -> mediasqueeze_av::Result<u64> + Send,
    {
        pub(crate) fn new(size_for: F) -> Self {
            Self {
                size_for: Mutex::new(size_for),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn apply(&self, file: &Path, request: SizeRequest) -> mediasqueeze_av::Result<u64> {
            self.calls.lock().unwrap().push(request);
            let current = std::fs::metadata(file)?.len();
            let mut size_for = self.size_for.lock().unwrap();
            let size = (*size_for)(request, current)?;
            // Like jpegoptim, never write a larger file.
            if size < current {
                std::fs::write(file, vec![b'j'; size as usize])?;
            }
            Ok(size.min(current))
        }
    }

    #[async_trait]
    impl<F> SizeReducer for ScriptedReducer<F>
    where
        F: FnMut(SizeRequest, u64) -> mediasqueeze_av::Result<u64> + Send,
    {
        async fn reduce_to_size(&self, file: &Path, target_bytes: u64) -> mediasqueeze_av::Result<u64> {
            self.apply(file, SizeRequest::ToSize(target_bytes))
        }

        async fn reduce_by_percent(&self, file: &Path, percent: u32) -> mediasqueeze_av::Result<u64> {
            self.apply(file, SizeRequest::ByPercent(percent))
        }
    }

    fn working_file(dir: &Path, size: usize) -> PathBuf {
        let path = dir.join("photo.jpg");
        std::fs::write(&path, vec![b'o'; size]).unwrap();
        path
    }

    fn leftover_attempts(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".attempt")
            })
            .count()
    }

    #[tokio::test]
    async fn direct_attempt_reaches_target() {
        let dir = tempfile::tempdir().unwrap();
        let working = working_file(dir.path(), 6000);
        let reducer = ScriptedReducer::new(|_, _| Ok(4000));

        let report = SizeOptimizer::new(&reducer, CancellationToken::new())
            .optimize(&working, 4999, 10)
            .await
            .unwrap();

        assert_eq!(report.outcome, Outcome::Reached);
        assert_eq!(report.iterations(), 1);
        assert_eq!(report.final_size, 4000);
        assert_eq!(report.shortfall_bytes, 0);
        assert_eq!(std::fs::metadata(&working).unwrap().len(), 4000);
        assert_eq!(leftover_attempts(dir.path()), 0);
    }

    #[tokio::test]
    async fn stall_keeps_best_size() {
        let dir = tempfile::tempdir().unwrap();
        let working = working_file(dir.path(), 10_000);
        let reducer = ScriptedReducer::new(|request, current| {
            let wanted = match request {
                SizeRequest::ToSize(bytes) => bytes,
                SizeRequest::ByPercent(p) => current * u64::from(100 - p) / 100,
            };
            Ok(wanted.max(9_600))
        });

        let report = SizeOptimizer::new(&reducer, CancellationToken::new())
            .optimize(&working, 1_000, 100)
            .await
            .unwrap();

        assert_eq!(report.outcome, Outcome::Stalled);
        assert_eq!(report.final_size, 9_600);
        assert_eq!(report.shortfall_bytes, 8_600);
        assert!(reducer
            .calls
            .lock()
            .unwrap()
            .iter()
            .all(|r| !matches!(r, SizeRequest::ByPercent(p) if *p > 50)));
        assert_eq!(std::fs::metadata(&working).unwrap().len(), 9_600);
        assert_eq!(leftover_attempts(dir.path()), 0);
    }

    #[tokio::test]
    async fn working_file_only_shrinks() {
        let dir = tempfile::tempdir().unwrap();
        let working = working_file(dir.path(), 1000);
        let mut script = vec![900, 990, 800, 850, 700].into_iter();
        let reducer = ScriptedReducer::new(move |_, _| Ok(script.next().unwrap_or(700)));

        let report = SizeOptimizer::new(&reducer, CancellationToken::new())
            .optimize(&working, 10, 5)
            .await
            .unwrap();

        assert_eq!(report.outcome, Outcome::IterationLimit);
        let committed: Vec<u64> = report
            .attempts
            .iter()
            .filter(|a| a.made_progress)
            .map(|a| a.resulting_size_bytes)
            .collect();
        assert_eq!(committed, [900, 800, 700]);
        assert_eq!(std::fs::metadata(&working).unwrap().len(), 700);
    }

    #[tokio::test]
    async fn interrupt_leaves_committed_file_intact() {
        let dir = tempfile::tempdir().unwrap();
        let working = working_file(dir.path(), 1000);
        let cancel = CancellationToken::new();
        let trip = cancel.clone();
        let mut calls = 0;
        let reducer = ScriptedReducer::new(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(900)
            } else {
                trip.cancel();
                Err(mediasqueeze_av::Error::Cancelled {
                    tool: "jpegoptim".into(),
                })
            }
        });

        let err = SizeOptimizer::new(&reducer, cancel)
            .optimize(&working, 10, 10)
            .await
            .unwrap_err();

        assert_eq!(exit_code(&err), INTERRUPTED);
        assert_eq!(std::fs::read(&working).unwrap(), vec![b'j'; 900]);
        assert_eq!(leftover_attempts(dir.path()), 0);
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let working = working_file(dir.path(), 1000);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let reducer = ScriptedReducer::new(|_, _| Ok(1));

        let err = SizeOptimizer::new(&reducer, cancel)
            .optimize(&working, 10, 10)
            .await
            .unwrap_err();

        assert_eq!(exit_code(&err), INTERRUPTED);
        assert!(reducer.calls.lock().unwrap().is_empty());
        assert_eq!(std::fs::metadata(&working).unwrap().len(), 1000);
    }

    #[tokio::test]
    async fn reducer_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let working = working_file(dir.path(), 1000);
        let reducer = ScriptedReducer::new(|_, _| {
            Err(mediasqueeze_av::Error::tool_failed("jpegoptim", "corrupt JPEG"))
        });

        let err = SizeOptimizer::new(&reducer, CancellationToken::new())
            .optimize(&working, 10, 10)
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("corrupt JPEG"));
        assert_eq!(std::fs::metadata(&working).unwrap().len(), 1000);
        assert_eq!(leftover_attempts(dir.path()), 0);
    }
}
