//! External tool detection, version gating and management.
//!
//! The [`ToolRegistry`] discovers and caches the locations of the external
//! CLI tools (jpegoptim, exiftool, ffmpeg, ffprobe) and hands out
//! [`ToolCommand`]s preconfigured with the tool's path and timeout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::command::{ToolCommand, DEFAULT_TIMEOUT};
use crate::{Error, Result};

/// Known tool names that the registry manages.
pub const KNOWN_TOOLS: &[&str] = &["jpegoptim", "exiftool", "ffmpeg", "ffprobe"];

/// Paths, timeout and version requirements for external tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub jpegoptim_path: Option<PathBuf>,
    pub exiftool_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// Per-invocation timeout in seconds.
    pub timeout_secs: u64,
    /// Supported jpegoptim versions.
    pub jpegoptim_version: VersionReq,
    /// Supported exiftool versions.
    pub exiftool_version: VersionReq,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            jpegoptim_path: None,
            exiftool_path: None,
            ffmpeg_path: None,
            ffprobe_path: None,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            jpegoptim_version: default_jpegoptim_req(),
            exiftool_version: default_exiftool_req(),
        }
    }
}

fn default_jpegoptim_req() -> VersionReq {
    VersionReq::parse(">=1.4.0, <2").unwrap_or(VersionReq::STAR)
}

fn default_exiftool_req() -> VersionReq {
    VersionReq::parse(">=11.88").unwrap_or(VersionReq::STAR)
}

impl ToolsConfig {
    /// Timeout applied to every tool invocation.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn custom_path(&self, name: &str) -> Option<&PathBuf> {
        match name {
            "jpegoptim" => self.jpegoptim_path.as_ref(),
            "exiftool" => self.exiftool_path.as_ref(),
            "ffmpeg" => self.ffmpeg_path.as_ref(),
            "ffprobe" => self.ffprobe_path.as_ref(),
            _ => None,
        }
    }

    fn version_req(&self, name: &str) -> Option<VersionReq> {
        match name {
            "jpegoptim" => Some(self.jpegoptim_version.clone()),
            "exiftool" => Some(self.exiftool_version.clone()),
            _ => None,
        }
    }
}

/// Configuration for a single discovered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Human-readable tool name (e.g. "jpegoptim").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
    /// Optional version requirement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_req: Option<VersionReq>,
    /// Maximum execution time before the tool is killed.
    #[serde(
        default = "default_timeout",
        with = "duration_secs",
        skip_serializing_if = "is_default_timeout"
    )]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn is_default_timeout(d: &Duration) -> bool {
    *d == DEFAULT_TIMEOUT
}

/// Serde helpers to (de)serialize `Duration` as whole seconds.
mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl ToolConfig {
    /// A command for this tool with its timeout applied.
    pub fn command(&self) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.path.clone());
        cmd.timeout(self.timeout);
        cmd
    }
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Parsed version, if it could be detected.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
    /// Version requirement, if the tool has one.
    pub required: Option<String>,
    /// Whether the detected version satisfies the requirement.
    pub supported: bool,
}

/// Registry holding discovered tool configurations.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// A configured path is used when it exists; otherwise [`which::which`]
    /// locates the tool. Tools that are not found are omitted.
    pub fn discover(config: &ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let resolved = match config.custom_path(name) {
                Some(p) if p.exists() => Some(p.clone()),
                Some(p) => {
                    tracing::warn!("Configured {} path {:?} does not exist; searching PATH", name, p);
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            if let Some(path) = resolved {
                tracing::debug!("Found {} at {:?}", name, path);
                tools.insert(
                    name.to_string(),
                    ToolConfig {
                        name: name.to_string(),
                        path,
                        version_req: config.version_req(name),
                        timeout: config.timeout(),
                    },
                );
            }
        }

        Self { tools }
    }

    /// Build a registry from explicit tool configs.
    pub fn from_tools(tools: impl IntoIterator<Item = ToolConfig>) -> Self {
        Self {
            tools: tools.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    /// Return the [`ToolConfig`] for the given tool, or [`Error::ToolNotFound`]
    /// if it was not found during discovery.
    pub fn require(&self, name: &str) -> Result<&ToolConfig> {
        self.tools
            .get(name)
            .ok_or_else(|| Error::tool_not_found(name))
    }

    /// A command for the named tool.
    pub fn command(&self, name: &str) -> Result<ToolCommand> {
        self.require(name).map(ToolConfig::command)
    }

    /// Detect the tool's version and check it against its requirement.
    pub async fn verify_version(&self, name: &str) -> Result<Version> {
        let tool = self.require(name)?;
        let version = detect_version(tool).await?;

        if let Some(req) = &tool.version_req {
            if !req.matches(&version) {
                return Err(Error::UnsupportedVersion {
                    tool: name.to_string(),
                    found: version.to_string(),
                    required: req.to_string(),
                });
            }
        }

        tracing::debug!("{} version {}", name, version);
        Ok(version)
    }

    /// Check all known tools and return availability information.
    pub async fn check_all(&self) -> Vec<ToolInfo> {
        let mut infos = Vec::with_capacity(KNOWN_TOOLS.len());
        for &name in KNOWN_TOOLS {
            let info = match self.tools.get(name) {
                Some(cfg) => {
                    let version = detect_version(cfg).await.ok();
                    let supported = match (&version, &cfg.version_req) {
                        (Some(v), Some(req)) => req.matches(v),
                        (Some(_), None) => true,
                        (None, _) => false,
                    };
                    ToolInfo {
                        name: name.to_string(),
                        available: true,
                        version: version.map(|v| v.to_string()),
                        path: Some(cfg.path.clone()),
                        required: cfg.version_req.as_ref().map(|r| r.to_string()),
                        supported,
                    }
                }
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                    required: None,
                    supported: false,
                },
            };
            infos.push(info);
        }
        infos
    }

    /// Iterate over all registered tool configs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ToolConfig)> {
        self.tools.iter()
    }
}

fn version_arg(name: &str) -> &'static str {
    match name {
        "ffmpeg" | "ffprobe" => "-version",
        "exiftool" => "-ver",
        _ => "--version",
    }
}

async fn detect_version(tool: &ToolConfig) -> Result<Version> {
    let output = tool
        .command()
        .arg(version_arg(&tool.name))
        .timeout(Duration::from_secs(5))
        .execute()
        .await?;
    let text = format!("{}{}", output.stdout, output.stderr);
    parse_version(&text).ok_or_else(|| {
        Error::parse_error(
            &tool.name,
            format!("could not find a version in {:?}", text.trim()),
        )
    })
}

/// Extract the first `major.minor[.patch]` from tool output.
///
/// Two-part versions such as exiftool's `11.88` are padded to `11.88.0`.
pub fn parse_version(text: &str) -> Option<Version> {
    static VERSION: OnceLock<Option<Regex>> = OnceLock::new();
    let re = VERSION
        .get_or_init(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").ok())
        .as_ref()?;
    let caps = re.captures(text)?;
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
    Some(Version::new(part(1)?, part(2)?, part(3).unwrap_or(0)))
}
