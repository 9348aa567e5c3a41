//! `reduce-jpeg-size`: shrink a JPEG below a size limit with jpegoptim.

use std::path::PathBuf;

use anyhow::{Context, Result};
use mediasqueeze_av::{Jpegoptim, SizeReducer, ToolRegistry, Workspace};
use tokio_util::sync::CancellationToken;

use super::{ensure_writable, read_input, staging_name, write_output};
use crate::config::Config;
use crate::optimizer::{OptimizationReport, SizeOptimizer};

#[derive(Debug, Clone)]
pub struct ReduceArgs {
    /// Input JPEG; stdin when absent.
    pub input: Option<PathBuf>,
    /// Output path; stdout when absent.
    pub output: Option<PathBuf>,
    pub max_size_kb: u64,
    pub max_iterations: u32,
    pub overwrite: bool,
}

pub async fn run(
    config: &Config,
    args: &ReduceArgs,
    cancel: CancellationToken,
) -> Result<OptimizationReport> {
    if let Some(output) = &args.output {
        ensure_writable(output, args.overwrite)?;
    }

    let tools = ToolRegistry::discover(&config.tools);
    let version = tools
        .verify_version("jpegoptim")
        .await
        .context("jpegoptim is required for reduce-jpeg-size")?;
    tracing::debug!("Using jpegoptim {}", version);

    let reducer = Jpegoptim::new(&tools, cancel.clone())?;
    reduce_with(&reducer, args, cancel).await
}

/// Run the optimizer with an explicit reducer.
pub async fn reduce_with(
    reducer: &dyn SizeReducer,
    args: &ReduceArgs,
    cancel: CancellationToken,
) -> Result<OptimizationReport> {
    if let Some(output) = &args.output {
        ensure_writable(output, args.overwrite)?;
    }
    if args.max_size_kb == 0 {
        anyhow::bail!("--max-size must be at least 1 KB");
    }

    let bytes = read_input(args.input.as_deref()).await?;
    let workspace = Workspace::new(staging_name(args.input.as_deref(), args.output.as_deref()))?;
    tokio::fs::write(workspace.output(), &bytes).await?;

    let report = SizeOptimizer::new(reducer, cancel)
        .optimize(&workspace.output(), args.max_size_kb * 1024, args.max_iterations)
        .await?;

    write_output(workspace, args.output.as_deref()).await?;

    eprintln!(
        "Reduced: {} → {} bytes ({:.1}% reduction)",
        report.initial_size,
        report.final_size,
        report.reduction_percent()
    );
    eprintln!("Iterations: {}", report.iterations());
    if !report.outcome.is_success() {
        tracing::warn!(
            "Target of {} KB not reached ({:?}); still {} bytes over",
            args.max_size_kb,
            report.outcome,
            report.shortfall_bytes
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::runner::tests::ScriptedReducer;
    use crate::optimizer::Outcome;

    fn args(input: PathBuf, output: PathBuf) -> ReduceArgs {
        ReduceArgs {
            input: Some(input),
            output: Some(output),
            max_size_kb: 4,
            max_iterations: 10,
            overwrite: false,
        }
    }

    #[tokio::test]
    async fn reduces_into_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.jpg");
        let output = dir.path().join("photo.small.jpg");
        std::fs::write(&input, vec![0u8; 8192]).unwrap();
        let reducer = ScriptedReducer::new(|_, _| Ok(3000));

        let report = reduce_with(&reducer, &args(input.clone(), output.clone()), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, Outcome::Reached);
        assert_eq!(std::fs::metadata(&output).unwrap().len(), 3000);
        assert_eq!(std::fs::metadata(&input).unwrap().len(), 8192);
    }

    #[tokio::test]
    async fn existing_output_is_checked_first() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.jpg");
        let output = dir.path().join("taken.jpg");
        std::fs::write(&input, vec![0u8; 8192]).unwrap();
        std::fs::write(&output, b"old").unwrap();
        let reducer = ScriptedReducer::new(|_, _| Ok(3000));

        let err = reduce_with(&reducer, &args(input, output.clone()), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("already exists"));
        assert!(reducer.calls.lock().unwrap().is_empty());
        assert_eq!(std::fs::read(&output).unwrap(), b"old");
    }

    #[tokio::test]
    async fn interrupted_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.jpg");
        let output = dir.path().join("photo.small.jpg");
        std::fs::write(&input, vec![0u8; 8192]).unwrap();
        let cancel = CancellationToken::new();
        let trip = cancel.clone();
        let reducer = ScriptedReducer::new(move |_, _| {
            trip.cancel();
            Err(mediasqueeze_av::Error::Cancelled {
                tool: "jpegoptim".into(),
            })
        });

        let err = reduce_with(&reducer, &args(input, output.clone()), cancel)
            .await
            .unwrap_err();

        assert_eq!(crate::exit::exit_code(&err), crate::exit::INTERRUPTED);
        assert!(!output.exists());
    }
}
