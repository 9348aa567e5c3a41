//! Packing a directory of unique frames into one animated WebP.

use std::ffi::{OsStr, OsString};
use std::path::Path;

use mediasqueeze_frames::{FrameFormat, FramesMetadata};
use tokio_util::sync::CancellationToken;

use crate::tools::ToolRegistry;
use crate::Result;

/// Lossy quality of packed frames.
pub const WEBP_QUALITY: u32 = 95;

/// libwebp effort, 0 (fast) to 6 (smallest).
pub const WEBP_COMPRESSION_LEVEL: u32 = 6;

/// Encode the `count` frames named by [`FramesMetadata::frame_file_name`] in
/// `frames_dir` as the frames of one animated WebP at `output`.
pub async fn pack_animated_webp(
    tools: &ToolRegistry,
    frames_dir: &Path,
    format: FrameFormat,
    count: usize,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut cmd = tools.command("ffmpeg")?;
    cmd.args(pack_args(frames_dir, format, count, output))
        .cancel_on(cancel.clone());

    tracing::info!("Packing {} frames into {:?}", count, output);
    cmd.execute().await?;
    Ok(())
}

/// Full ffmpeg argument list for packing.
pub fn pack_args(frames_dir: &Path, format: FrameFormat, count: usize, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-nostdin".into(), "-y".into()];
    // Frame timing lives in metadata.json; one second per frame keeps them all.
    flag(&mut args, "-framerate", "1");
    flag(&mut args, "-start_number", "0");
    flag(
        &mut args,
        "-i",
        frames_dir.join(FramesMetadata::frame_file_pattern(format)),
    );
    flag(&mut args, "-frames:v", count.to_string());
    flag(&mut args, "-c:v", "libwebp_anim");
    flag(&mut args, "-lossless", "0");
    flag(&mut args, "-quality", WEBP_QUALITY.to_string());
    flag(&mut args, "-compression_level", WEBP_COMPRESSION_LEVEL.to_string());
    flag(&mut args, "-loop", "0");
    args.push(output.into());
    args
}

fn flag(args: &mut Vec<OsString>, name: &str, value: impl AsRef<OsStr>) {
    args.push(name.into());
    args.push(value.as_ref().to_os_string());
}
