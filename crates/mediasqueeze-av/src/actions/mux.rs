//! Encoding a materialized timeline into a video with ffmpeg.

use std::ffi::{OsStr, OsString};
use std::path::Path;

use mediasqueeze_frames::MaterializedTimeline;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::tools::ToolRegistry;
use crate::Result;

/// Video encoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeParams {
    pub codec: String,
    pub crf: u32,
    pub preset: String,
    pub pix_fmt: String,
    /// Audio encoder; `None` copies the source track as-is.
    pub audio_codec: Option<String>,
    /// Audio bitrate such as `128k`; only used together with `audio_codec`.
    pub audio_bitrate: Option<String>,
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            crf: 23,
            preset: "medium".to_string(),
            pix_fmt: "yuv420p".to_string(),
            audio_codec: None,
            audio_bitrate: None,
        }
    }
}

/// Encode `timeline` into `output`, taking the first audio track of `audio` if given.
///
/// The timeline is consumed: once muxed, its files are no longer needed.
pub async fn mux(
    tools: &ToolRegistry,
    timeline: MaterializedTimeline,
    audio: Option<&Path>,
    params: &EncodeParams,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut cmd = tools.command("ffmpeg")?;
    cmd.args(mux_args(&timeline, audio, params, output))
        .cancel_on(cancel.clone());

    tracing::info!(
        "Encoding {:.2}s of video with {} (crf {}, {}) -> {:?}",
        timeline.duration(),
        params.codec,
        params.crf,
        params.preset,
        output
    );
    cmd.execute().await?;
    Ok(())
}

/// Full ffmpeg argument list for a mux.
pub fn mux_args(
    timeline: &MaterializedTimeline,
    audio: Option<&Path>,
    params: &EncodeParams,
    output: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-nostdin".into(), "-y".into()];

    match timeline {
        MaterializedTimeline::Variable { concat_list, .. } => {
            flag(&mut args, "-f", "concat");
            flag(&mut args, "-safe", "0");
            flag(&mut args, "-i", concat_list);
        }
        MaterializedTimeline::Constant {
            pattern, tick_rate, ..
        } => {
            flag(&mut args, "-framerate", tick_rate.to_string());
            flag(&mut args, "-i", pattern);
        }
    }

    if let Some(audio) = audio {
        flag(&mut args, "-i", audio);
        flag(&mut args, "-map", "0:v");
        flag(&mut args, "-map", "1:a:0?");
    }

    // yuv420p needs even dimensions.
    flag(&mut args, "-vf", "scale=trunc(iw/2)*2:trunc(ih/2)*2");
    flag(&mut args, "-c:v", &params.codec);
    flag(&mut args, "-crf", params.crf.to_string());
    flag(&mut args, "-preset", &params.preset);
    flag(&mut args, "-pix_fmt", &params.pix_fmt);

    match timeline {
        MaterializedTimeline::Variable { .. } => flag(&mut args, "-fps_mode", "vfr"),
        MaterializedTimeline::Constant { tick_rate, .. } => {
            flag(&mut args, "-r", tick_rate.to_string())
        }
    }

    if audio.is_some() {
        match &params.audio_codec {
            Some(codec) => {
                flag(&mut args, "-c:a", codec);
                if let Some(bitrate) = &params.audio_bitrate {
                    flag(&mut args, "-b:a", bitrate);
                }
            }
            None => flag(&mut args, "-c:a", "copy"),
        }
        flag(&mut args, "-strict", "experimental");
    }

    let is_mp4 = output
        .extension()
        .map(|e| e.eq_ignore_ascii_case("mp4") || e.eq_ignore_ascii_case("mov"))
        .unwrap_or(false);
    if is_mp4 {
        flag(&mut args, "-movflags", "+faststart");
    }

    args.push(output.into());
    args
}

fn flag(args: &mut Vec<OsString>, name: &str, value: impl AsRef<OsStr>) {
    args.push(name.into());
    args.push(value.as_ref().to_os_string());
}
