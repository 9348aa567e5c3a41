//! Error types for mediasqueeze-av.

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving external tools.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external tool is not available.
    #[error("tool not found: {tool}; is it installed and in PATH?")]
    ToolNotFound { tool: String },

    /// An external tool failed to execute or exited non-zero.
    #[error("tool execution failed: {tool}: {message}")]
    ToolFailed { tool: String, message: String },

    /// An external tool exceeded its time budget and was killed.
    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    /// The run was cancelled while the tool was running.
    #[error("{tool} was cancelled")]
    Cancelled { tool: String },

    /// The installed tool version is outside the supported range.
    #[error("{tool} version {found} is not supported (required: {required})")]
    UnsupportedVersion {
        tool: String,
        found: String,
        required: String,
    },

    /// Failed to parse tool output.
    #[error("failed to parse {tool} output: {message}")]
    ParseError { tool: String, message: String },

    /// The specified file was not found.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Workspace error.
    #[error("workspace error: {0}")]
    Workspace(String),

    /// The remote compression service rejected or failed the request.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Failure categories of the remote compression API.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Transport failure or a 5xx response.
    #[error("connection error: {0}")]
    Connectivity(String),

    /// The request was rejected (bad key, unsupported file, ...).
    #[error("client error ({status}): {message}")]
    Client { status: u16, message: String },

    /// The account's compression allowance is used up.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
}

impl Error {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a tool execution failed error.
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse_error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Whether this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}
