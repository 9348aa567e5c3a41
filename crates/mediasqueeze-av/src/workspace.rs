//! Private per-run workspace.
//!
//! A [`Workspace`] owns a temporary directory for intermediate files and a
//! staging path for the final output. Nothing is written at the destination
//! until [`Workspace::finalize`]; dropping the workspace removes everything.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::{Error, Result};

/// Workspace for a single run.
///
/// # Example
///
/// ```no_run
/// use mediasqueeze_av::Workspace;
///
/// let workspace = Workspace::new("slides.mp4").unwrap();
/// // ... write the result to workspace.output() ...
/// workspace.finalize(std::path::Path::new("/videos/slides.mp4")).unwrap();
/// ```
#[derive(Debug)]
pub struct Workspace {
    temp_dir: TempDir,
    output_name: String,
}

impl Workspace {
    /// Create a workspace whose staging output is named `output_name`.
    pub fn new(output_name: impl Into<String>) -> Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix("mediasqueeze-")
            .tempdir()
            .map_err(|e| Error::Workspace(format!("failed to create temp dir: {e}")))?;

        let output_name = output_name.into();
        let output_name = if output_name.is_empty() {
            "output".to_string()
        } else {
            output_name
        };

        Ok(Self {
            temp_dir,
            output_name,
        })
    }

    /// Create a workspace staging an output with the same file name as `dest`.
    pub fn for_destination(dest: &Path) -> Result<Self> {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::new(name)
    }

    /// The staging output path inside the workspace.
    pub fn output(&self) -> PathBuf {
        self.temp_dir.path().join(&self.output_name)
    }

    /// Path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a path for a named temporary file inside the workspace.
    pub fn temp_file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Create (if needed) and return a subdirectory of the workspace.
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Workspace(format!("failed to create {}: {e}", dir.display())))?;
        Ok(dir)
    }

    /// Move the staging output to `dest` and remove the workspace.
    ///
    /// Uses a rename when `dest` is on the same filesystem; otherwise the
    /// bytes are copied into a temporary file next to `dest` and persisted
    /// over it, so `dest` is never observed half-written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Workspace`] if the output does not exist or cannot be
    /// moved.
    pub fn finalize(self, dest: &Path) -> Result<PathBuf> {
        let output = self.output();
        if !output.exists() {
            return Err(Error::Workspace(format!(
                "output file does not exist: {}",
                output.display()
            )));
        }

        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .map_err(|e| Error::Workspace(format!("failed to create {}: {e}", parent.display())))?;

        if let Err(rename_err) = std::fs::rename(&output, dest) {
            tracing::debug!("Rename failed ({}), copying to {:?}", rename_err, dest);
            let mut staged = tempfile::NamedTempFile::new_in(&parent)
                .map_err(|e| Error::Workspace(format!("failed to stage output: {e}")))?;
            let mut source = std::fs::File::open(&output)?;
            std::io::copy(&mut source, staged.as_file_mut())?;
            staged
                .persist(dest)
                .map_err(|e| Error::Workspace(format!("failed to move output into place: {e}")))?;
        }

        Ok(dest.to_path_buf())
    }

    /// Read the staging output and remove the workspace.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let output = self.output();
        std::fs::read(&output).map_err(|e| {
            Error::Workspace(format!("failed to read output {}: {e}", output.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn workspace_paths() {
        let ws = Workspace::new("movie.mp4").unwrap();
        assert!(ws.output().starts_with(ws.path()));
        assert_eq!(ws.output().file_name().unwrap(), "movie.mp4");
        assert!(ws
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("mediasqueeze-"));
    }

    #[test]
    fn temp_file_and_subdir_inside_workspace() {
        let ws = Workspace::new("out.jpg").unwrap();
        let tf = ws.temp_file("attempt.jpg");
        assert!(tf.starts_with(ws.path()));

        let frames = ws.subdir("frames").unwrap();
        assert!(frames.is_dir());
        assert!(frames.starts_with(ws.path()));
    }

    #[test]
    fn finalize_moves_output() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("movie.mp4");

        let ws = Workspace::for_destination(&dest).unwrap();
        fs::write(ws.output(), b"processed").unwrap();
        let root = ws.path().to_path_buf();

        let final_path = ws.finalize(&dest).unwrap();
        assert_eq!(final_path, dest);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "processed");
        assert!(!root.exists());
    }

    #[test]
    fn finalize_replaces_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("photo.jpg");
        fs::write(&dest, b"original").unwrap();

        let ws = Workspace::for_destination(&dest).unwrap();
        fs::write(ws.output(), b"smaller").unwrap();
        ws.finalize(&dest).unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "smaller");
    }

    #[test]
    fn finalize_fails_when_output_missing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.mp4");

        let ws = Workspace::for_destination(&dest).unwrap();
        assert!(matches!(ws.finalize(&dest), Err(Error::Workspace(_))));
        assert!(!dest.exists());
    }

    #[test]
    fn dropping_workspace_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.mp4");

        let ws = Workspace::for_destination(&dest).unwrap();
        fs::write(ws.output(), b"half done").unwrap();
        let root = ws.path().to_path_buf();
        drop(ws);

        assert!(!dest.exists());
        assert!(!root.exists());
    }

    #[test]
    fn into_bytes_reads_output() {
        let ws = Workspace::new("out.jpg").unwrap();
        fs::write(ws.output(), b"jpeg bytes").unwrap();
        assert_eq!(ws.into_bytes().unwrap(), b"jpeg bytes");
    }
}
