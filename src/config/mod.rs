mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Environment variable consulted for the Tinify API key
pub const TINIFY_KEY_ENV: &str = "MEDIASQUEEZE_TINIFY_KEY";

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./mediasqueeze.toml",
        "~/.config/mediasqueeze/config.toml",
        "/etc/mediasqueeze/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Resolve the Tinify API key: flag, then environment, then config file.
pub fn resolve_api_key(flag: Option<&str>, config: &RemoteConfig) -> Option<String> {
    let present = |key: &String| !key.trim().is_empty();
    flag.map(str::to_string)
        .filter(present)
        .or_else(|| std::env::var(TINIFY_KEY_ENV).ok().filter(present))
        .or_else(|| config.api_key.clone().filter(present))
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.tools.timeout_secs == 0 {
        anyhow::bail!("Tool timeout cannot be 0");
    }

    if config.reduce.max_size_kb == 0 {
        anyhow::bail!("reduce.max_size_kb must be at least 1");
    }
    if config.reduce.max_iterations == 0 {
        anyhow::bail!("reduce.max_iterations must be at least 1");
    }

    if config.remote.base_url.trim().is_empty() {
        anyhow::bail!("remote.base_url cannot be empty");
    }
    if config.remote.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
        tracing::warn!("remote.api_key is set but empty");
    }

    if config.extract.stride == 0 {
        anyhow::bail!("extract.stride must be at least 1");
    }

    if !(config.reassemble.fps.is_finite() && config.reassemble.fps > 0.0) {
        anyhow::bail!(
            "reassemble.fps must be a positive number, got {}",
            config.reassemble.fps
        );
    }
    if config.reassemble.encode.crf > 63 {
        anyhow::bail!(
            "reassemble.encode.crf must be between 0 and 63, got {}",
            config.reassemble.encode.crf
        );
    }
    let encode = &config.reassemble.encode;
    if encode.audio_bitrate.is_some() && encode.audio_codec.is_none() {
        anyhow::bail!("reassemble.encode.audio_bitrate needs reassemble.encode.audio_codec");
    }

    for (name, path) in [
        ("jpegoptim", &config.tools.jpegoptim_path),
        ("exiftool", &config.tools.exiftool_path),
        ("ffmpeg", &config.tools.ffmpeg_path),
        ("ffprobe", &config.tools.ffprobe_path),
    ] {
        if let Some(path) = path {
            if !path.exists() {
                tracing::warn!("Configured {} path does not exist: {:?}", name, path);
            }
        }
    }

    Ok(())
}
