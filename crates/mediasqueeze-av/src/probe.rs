//! Video probing with ffprobe.
//!
//! Shells out to `ffprobe -v error -print_format json -show_format -show_streams`
//! and maps the first video stream into [`VideoInfo`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::tools::ToolRegistry;
use crate::{Error, Result};

/// Properties of a source video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Frames per second, from `r_frame_rate`.
    pub fps: f64,
    /// Duration in seconds (stream duration, else container duration).
    pub duration: f64,
    pub frame_count: u64,
    pub has_audio: bool,
}

/// Probe `path` with ffprobe.
pub async fn probe_video(
    tools: &ToolRegistry,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<VideoInfo> {
    if !path.is_file() {
        return Err(Error::file_not_found(path));
    }

    let mut cmd = tools.command("ffprobe")?;
    cmd.args([
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ]);
    cmd.arg(path);
    cmd.cancel_on(cancel.clone());

    let output = cmd.execute().await?;
    let info = parse_ffprobe_output(&output.stdout)?;

    tracing::info!(
        "Video detected: {}x{}, {:.2} fps, {:.2}s, {} frames{}",
        info.width,
        info.height,
        info.fps,
        info.duration,
        info.frame_count,
        if info.has_audio { ", with audio" } else { "" }
    );

    Ok(info)
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    nb_frames: Option<String>,
}

/// Map ffprobe JSON output into [`VideoInfo`].
pub fn parse_ffprobe_output(json: &str) -> Result<VideoInfo> {
    let ff: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::parse_error("ffprobe", format!("JSON parse error: {e}")))?;

    let video = ff
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::parse_error("ffprobe", "no video stream found"))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(Error::parse_error("ffprobe", "video stream has no dimensions")),
    };

    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .ok_or_else(|| {
            Error::parse_error(
                "ffprobe",
                format!("invalid frame rate {:?}", video.r_frame_rate),
            )
        })?;

    let duration = parse_seconds(video.duration.as_deref())
        .or_else(|| parse_seconds(ff.format.as_ref().and_then(|f| f.duration.as_deref())))
        .unwrap_or(0.0);

    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or_else(|| (duration * fps).round() as u64);

    let has_audio = ff
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(VideoInfo {
        width,
        height,
        fps,
        duration,
        frame_count,
        has_audio,
    })
}

/// Parse `num/den` or a plain number. Zero or negative rates are rejected.
fn parse_frame_rate(s: &str) -> Option<f64> {
    let fps = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

fn parse_seconds(s: Option<&str>) -> Option<f64> {
    s?.parse::<f64>().ok().filter(|d| d.is_finite() && *d > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN_RECORDING: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "h264",
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30000/1001",
                "duration": "12.012000",
                "nb_frames": "360"
            },
            {
                "index": 1,
                "codec_name": "aac",
                "codec_type": "audio",
                "duration": "12.000000"
            }
        ],
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "12.030000"
        }
    }"#;

    #[test]
    fn parses_stream_properties() {
        let info = parse_ffprobe_output(SCREEN_RECORDING).unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert!((info.fps - 29.97).abs() < 0.01);
        assert_eq!(info.duration, 12.012);
        assert_eq!(info.frame_count, 360);
        assert!(info.has_audio);
    }

    #[test]
    fn falls_back_to_format_duration() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 640, "height": 480, "r_frame_rate": "25/1"}],
            "format": {"duration": "4.000000"}
        }"#;
        let info = parse_ffprobe_output(json).unwrap();
        assert_eq!(info.duration, 4.0);
        assert_eq!(info.frame_count, 100);
        assert!(!info.has_audio);
    }

    #[test]
    fn missing_video_stream_is_error() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        assert!(matches!(
            parse_ffprobe_output(json),
            Err(Error::ParseError { .. })
        ));
    }

    #[test]
    fn zero_denominator_rate_is_error() {
        let json = r#"{"streams": [{"codec_type": "video", "width": 2, "height": 2, "r_frame_rate": "0/0"}]}"#;
        assert!(parse_ffprobe_output(json).is_err());
    }

    #[test]
    fn frame_rate_forms() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert_eq!(parse_frame_rate("30"), Some(30.0));
        assert_eq!(parse_frame_rate("1/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }
}
