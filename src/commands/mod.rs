//! Standalone commands.
//!
//! Commands that take a single file read it from a path or stdin and write
//! their result to a path or stdout. Reports go to stderr.

pub mod compress;
pub mod extract;
pub mod reassemble;
pub mod reduce;

use std::path::Path;

use anyhow::{Context, Result};
use mediasqueeze_av::Workspace;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub use crate::pipeline::ensure_writable;

/// Read the input file, or all of stdin when no path is given.
pub async fn read_input(input: Option<&Path>) -> Result<Vec<u8>> {
    match input {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read input file: {:?}", path)),
        None => {
            let mut bytes = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut bytes)
                .await
                .context("Failed to read stdin")?;
            if bytes.is_empty() {
                anyhow::bail!("No input: pass a file or pipe one on stdin");
            }
            Ok(bytes)
        }
    }
}

/// Move the workspace's staging output to `output`, or write it to stdout.
pub async fn write_output(workspace: Workspace, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            workspace
                .finalize(path)
                .with_context(|| format!("Failed to write output file: {:?}", path))?;
        }
        None => {
            let bytes = workspace.into_bytes()?;
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(&bytes)
                .await
                .context("Failed to write stdout")?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

/// Staging file name for a single-file command.
pub(crate) fn staging_name(input: Option<&Path>, output: Option<&Path>) -> String {
    output
        .or(input)
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "stdin.jpg".to_string())
}
