//! Configuration loading, validation and API key resolution.

use mediasqueeze::config::{
    load_config, load_config_or_default, resolve_api_key, validate_config, Config, MetadataMode,
    ReassembleMode, RemoteConfig, TINIFY_KEY_ENV,
};
use mediasqueeze_frames::{FrameFormat, FrameLayout, LinkStrategy, TimelineMode};
use serial_test::serial;
use std::fs;
use tempfile::tempdir;

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let temp = tempdir().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, contents).unwrap();
    (temp, path)
}

#[test]
fn defaults_are_valid() {
    let config = Config::default();
    validate_config(&config).unwrap();

    assert_eq!(config.reduce.max_size_kb, 4999);
    assert_eq!(config.reduce.max_iterations, 10);
    assert_eq!(config.remote.hard_limit_bytes, 15 * 1024 * 1024);
    assert_eq!(config.remote.metadata, MetadataMode::Keep);
    assert_eq!(config.extract.stride, 1);
    assert_eq!(config.extract.format, FrameFormat::Png);
    assert_eq!(config.extract.layout, FrameLayout::Files);
    assert_eq!(config.reassemble.encode.audio_codec, None);
    assert_eq!(config.reassemble.mode, ReassembleMode::Vfr);
    assert_eq!(config.reassemble.link_strategy, LinkStrategy::HardOrCopy);
}

#[test]
fn empty_file_gives_defaults() {
    let (_temp, path) = write_config("");
    let config = load_config(&path).unwrap();
    assert_eq!(config.reduce.max_size_kb, 4999);
    assert_eq!(config.reassemble.timeline_mode(None, None), TimelineMode::Vfr);
}

#[test]
fn sections_parse() {
    let (_temp, path) = write_config(
        r#"
[tools]
timeout_secs = 60

[reduce]
max_size_kb = 200
max_iterations = 4

[remote]
api_key = "from-config"
base_url = "http://localhost:9999"
metadata = "strip"

[extract]
stride = 5
format = "jpeg"
layout = "animated-webp"
mpdecimate = true

[reassemble]
mode = "cfr"
fps = 2.5
link_strategy = "copy"

[reassemble.encode]
crf = 30
preset = "veryslow"
audio_codec = "aac"
audio_bitrate = "128k"
"#,
    );

    let config = load_config(&path).unwrap();
    assert_eq!(config.tools.timeout_secs, 60);
    assert_eq!(config.reduce.max_size_kb, 200);
    assert_eq!(config.reduce.max_iterations, 4);
    assert_eq!(config.remote.api_key.as_deref(), Some("from-config"));
    assert_eq!(config.remote.base_url, "http://localhost:9999");
    assert_eq!(config.remote.metadata, MetadataMode::Strip);
    assert_eq!(config.extract.stride, 5);
    assert_eq!(config.extract.format, FrameFormat::Jpg);
    assert_eq!(config.extract.layout, FrameLayout::AnimatedWebp);
    assert!(config.extract.mpdecimate);
    assert_eq!(config.reassemble.link_strategy, LinkStrategy::Copy);
    assert_eq!(config.reassemble.encode.crf, 30);
    assert_eq!(config.reassemble.encode.preset, "veryslow");
    assert_eq!(config.reassemble.encode.audio_codec.as_deref(), Some("aac"));
    assert_eq!(config.reassemble.encode.audio_bitrate.as_deref(), Some("128k"));
    // Unset encoder fields keep their defaults
    assert_eq!(config.reassemble.encode.codec, "libx264");
    assert_eq!(
        config.reassemble.timeline_mode(None, None),
        TimelineMode::Cfr { fps: 2.5 }
    );
}

#[test]
fn cli_overrides_timeline_mode() {
    let config = Config::default();
    assert_eq!(
        config
            .reassemble
            .timeline_mode(Some(ReassembleMode::Cfr), Some(10.0)),
        TimelineMode::Cfr { fps: 10.0 }
    );
    assert_eq!(
        config.reassemble.timeline_mode(Some(ReassembleMode::Cfr), None),
        TimelineMode::Cfr { fps: 25.0 }
    );
}

#[test]
fn invalid_values_are_rejected() {
    for (toml, needle) in [
        ("[tools]\ntimeout_secs = 0", "timeout"),
        ("[reduce]\nmax_size_kb = 0", "max_size_kb"),
        ("[reduce]\nmax_iterations = 0", "max_iterations"),
        ("[remote]\nbase_url = \"\"", "base_url"),
        ("[extract]\nstride = 0", "stride"),
        ("[reassemble]\nfps = 0.0", "fps"),
        ("[reassemble.encode]\ncrf = 70", "crf"),
        ("[reassemble.encode]\naudio_bitrate = \"96k\"", "audio_codec"),
    ] {
        let (_temp, path) = write_config(toml);
        let err = load_config(&path).unwrap_err();
        assert!(
            format!("{:#}", err).contains(needle),
            "expected {needle:?} in {err:#}"
        );
    }
}

#[test]
fn malformed_toml_names_the_file() {
    let (_temp, path) = write_config("[reduce\nmax_size_kb = ");
    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn unknown_mode_is_rejected() {
    let (_temp, path) = write_config("[reassemble]\nmode = \"sometimes\"");
    assert!(load_config(&path).is_err());
}

#[test]
fn explicit_missing_path_is_an_error() {
    let temp = tempdir().unwrap();
    let err = load_config_or_default(Some(&temp.path().join("absent.toml"))).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
#[serial]
fn api_key_flag_wins() {
    std::env::set_var(TINIFY_KEY_ENV, "from-env");
    let remote = RemoteConfig {
        api_key: Some("from-config".to_string()),
        ..RemoteConfig::default()
    };

    assert_eq!(
        resolve_api_key(Some("from-flag"), &remote).as_deref(),
        Some("from-flag")
    );
    std::env::remove_var(TINIFY_KEY_ENV);
}

#[test]
#[serial]
fn api_key_env_beats_config() {
    std::env::set_var(TINIFY_KEY_ENV, "from-env");
    let remote = RemoteConfig {
        api_key: Some("from-config".to_string()),
        ..RemoteConfig::default()
    };

    assert_eq!(resolve_api_key(None, &remote).as_deref(), Some("from-env"));
    std::env::remove_var(TINIFY_KEY_ENV);
}

#[test]
#[serial]
fn api_key_falls_back_to_config() {
    std::env::remove_var(TINIFY_KEY_ENV);
    let remote = RemoteConfig {
        api_key: Some("from-config".to_string()),
        ..RemoteConfig::default()
    };
    assert_eq!(resolve_api_key(None, &remote).as_deref(), Some("from-config"));

    assert_eq!(resolve_api_key(None, &RemoteConfig::default()), None);
}

#[test]
#[serial]
fn blank_api_key_counts_as_missing() {
    std::env::set_var(TINIFY_KEY_ENV, "");
    assert_eq!(resolve_api_key(Some("  "), &RemoteConfig::default()), None);

    let remote = RemoteConfig {
        api_key: Some("from-config".to_string()),
        ..RemoteConfig::default()
    };
    assert_eq!(
        resolve_api_key(Some(""), &remote).as_deref(),
        Some("from-config")
    );
    std::env::remove_var(TINIFY_KEY_ENV);
}
