//! JPEG size reduction with jpegoptim.

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::tools::{ToolConfig, ToolRegistry};
use crate::{Error, Result};

/// In-place lossy size reduction of a single file.
///
/// Both methods rewrite `file` and return its resulting size in bytes.
#[async_trait]
pub trait SizeReducer: Send + Sync {
    /// Ask the encoder to hit `target_bytes` directly.
    async fn reduce_to_size(&self, file: &Path, target_bytes: u64) -> Result<u64>;

    /// Ask the encoder for a file `percent`% smaller than the current one.
    async fn reduce_by_percent(&self, file: &Path, percent: u32) -> Result<u64>;
}

/// [`SizeReducer`] backed by the `jpegoptim` binary.
#[derive(Debug, Clone)]
pub struct Jpegoptim {
    tool: ToolConfig,
    cancel: CancellationToken,
}

impl Jpegoptim {
    pub fn new(tools: &ToolRegistry, cancel: CancellationToken) -> Result<Self> {
        Ok(Self {
            tool: tools.require("jpegoptim")?.clone(),
            cancel,
        })
    }

    async fn run(&self, size_arg: String, file: &Path) -> Result<u64> {
        if !file.is_file() {
            return Err(Error::file_not_found(file));
        }
        let mut cmd = self.tool.command();
        cmd.arg(&size_arg).arg(file).cancel_on(self.cancel.clone());
        cmd.execute().await?;

        let size = tokio::fs::metadata(file).await?.len();
        tracing::debug!("jpegoptim {} -> {} bytes", size_arg, size);
        Ok(size)
    }
}

#[async_trait]
impl SizeReducer for Jpegoptim {
    async fn reduce_to_size(&self, file: &Path, target_bytes: u64) -> Result<u64> {
        self.run(size_to_arg(target_bytes), file).await
    }

    async fn reduce_by_percent(&self, file: &Path, percent: u32) -> Result<u64> {
        self.run(percent_to_arg(percent)?, file).await
    }
}

/// `--size=<KB>` for a target in bytes. jpegoptim's size unit is 1024 bytes.
pub fn size_to_arg(target_bytes: u64) -> String {
    format!("--size={}", (target_bytes / 1024).max(1))
}

/// `--size=<100-p>%` for a reduction of `percent`.
pub fn percent_to_arg(percent: u32) -> Result<String> {
    if !(1..=99).contains(&percent) {
        return Err(Error::InvalidInput(format!(
            "reduction percent must be between 1 and 99, got {percent}"
        )));
    }
    Ok(format!("--size={}%", 100 - percent))
}
