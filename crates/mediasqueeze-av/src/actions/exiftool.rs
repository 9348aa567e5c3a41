//! Metadata preservation with exiftool.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::tools::ToolRegistry;
use crate::Result;

/// Tags that must not be carried over to a recompressed image.
pub const DEFAULT_EXCLUDED_TAGS: &[&str] = &["ThumbnailImage", "Compression"];

/// Tags `-all:all` does not copy and that have to be requested explicitly.
const EXTRA_TAGS: &[&str] = &["InteropIndex", "InteropVersion"];

const EXIFTOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Copy all metadata from `source` to `target` in place, except `excluded_tags`.
pub async fn copy_metadata(
    tools: &ToolRegistry,
    source: &Path,
    target: &Path,
    excluded_tags: &[&str],
    cancel: &CancellationToken,
) -> Result<()> {
    let mut cmd = tools.command("exiftool")?;
    cmd.args(build_args(source, target, excluded_tags))
        .timeout(EXIFTOOL_TIMEOUT)
        .cancel_on(cancel.clone());

    tracing::debug!("Copying metadata {:?} -> {:?}", source, target);
    cmd.execute().await?;
    Ok(())
}

/// Arguments for an exiftool metadata copy.
pub fn build_args(source: &Path, target: &Path, excluded_tags: &[&str]) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-TagsFromFile".into(), source.into(), "-all:all".into()];
    args.extend(EXTRA_TAGS.iter().map(|tag| OsString::from(format!("-{tag}"))));
    args.extend(
        excluded_tags
            .iter()
            .map(|tag| OsString::from(format!("-{tag}="))),
    );
    args.push("-overwrite_original".into());
    args.push(target.into());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_copy_all_but_excluded_tags() {
        let args = build_args(
            Path::new("/in/original.jpg"),
            Path::new("/tmp/compressed"),
            DEFAULT_EXCLUDED_TAGS,
        );
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            [
                "-TagsFromFile",
                "/in/original.jpg",
                "-all:all",
                "-InteropIndex",
                "-InteropVersion",
                "-ThumbnailImage=",
                "-Compression=",
                "-overwrite_original",
                "/tmp/compressed",
            ]
        );
    }

    #[test]
    fn no_exclusions() {
        let args = build_args(Path::new("a.jpg"), Path::new("b.jpg"), &[]);
        assert_eq!(args.len(), 7);
        assert_eq!(args.last().unwrap(), "b.jpg");
    }

    #[tokio::test]
    async fn missing_exiftool_is_reported() {
        let registry = ToolRegistry::from_tools(Vec::new());
        let result = copy_metadata(
            &registry,
            Path::new("a.jpg"),
            Path::new("b.jpg"),
            DEFAULT_EXCLUDED_TAGS,
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(crate::Error::ToolNotFound { .. })));
    }
}
