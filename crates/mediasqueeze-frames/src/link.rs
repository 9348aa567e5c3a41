//! Zero-copy slot duplication.
//!
//! [`LinkOrCopy`] is the capability the materializer uses to make a slot refer
//! to bytes that were already written. Filesystems without hard-link support
//! can use [`HardLinkOrCopy`] or [`FileCopy`] without changing the planner.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::str::FromStr;

/// How a slot ended up referring to its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    HardLink,
    SymLink,
    Copy,
}

impl LinkKind {
    /// Whether the slot shares storage with its source.
    pub fn is_zero_copy(&self) -> bool {
        !matches!(self, LinkKind::Copy)
    }
}

/// Make `target` refer to the bytes already written at `source`.
pub trait LinkOrCopy: Send + Sync {
    fn link_or_copy(&self, source: &Path, target: &Path) -> io::Result<LinkKind>;
}

/// Hard links only; fails where the filesystem does not support them.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardLink;

impl LinkOrCopy for HardLink {
    fn link_or_copy(&self, source: &Path, target: &Path) -> io::Result<LinkKind> {
        std::fs::hard_link(source, target)?;
        Ok(LinkKind::HardLink)
    }
}

/// Symbolic links to the canonical file.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SymLink;

#[cfg(unix)]
impl LinkOrCopy for SymLink {
    fn link_or_copy(&self, source: &Path, target: &Path) -> io::Result<LinkKind> {
        let source = std::fs::canonicalize(source)?;
        std::os::unix::fs::symlink(source, target)?;
        Ok(LinkKind::SymLink)
    }
}

/// Plain byte copies.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCopy;

impl LinkOrCopy for FileCopy {
    fn link_or_copy(&self, source: &Path, target: &Path) -> io::Result<LinkKind> {
        std::fs::copy(source, target)?;
        Ok(LinkKind::Copy)
    }
}

/// Hard link, falling back to a copy when linking fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardLinkOrCopy;

impl LinkOrCopy for HardLinkOrCopy {
    fn link_or_copy(&self, source: &Path, target: &Path) -> io::Result<LinkKind> {
        match std::fs::hard_link(source, target) {
            Ok(()) => Ok(LinkKind::HardLink),
            Err(e) => {
                tracing::debug!("Hard link failed ({}), copying {:?}", e, target);
                std::fs::copy(source, target)?;
                Ok(LinkKind::Copy)
            }
        }
    }
}

/// Configurable choice of [`LinkOrCopy`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkStrategy {
    /// Hard links; materialization fails if they are unsupported.
    Hard,
    /// Symbolic links (unix only).
    Symbolic,
    /// Always copy.
    Copy,
    /// Hard links with a copy fallback.
    #[default]
    HardOrCopy,
}

impl LinkStrategy {
    /// Build the linker for this strategy.
    pub fn linker(&self) -> Box<dyn LinkOrCopy> {
        match self {
            LinkStrategy::Hard => Box::new(HardLink),
            #[cfg(unix)]
            LinkStrategy::Symbolic => Box::new(SymLink),
            #[cfg(not(unix))]
            LinkStrategy::Symbolic => Box::new(HardLinkOrCopy),
            LinkStrategy::Copy => Box::new(FileCopy),
            LinkStrategy::HardOrCopy => Box::new(HardLinkOrCopy),
        }
    }
}

impl FromStr for LinkStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hard" => Ok(LinkStrategy::Hard),
            "symbolic" | "symlink" => Ok(LinkStrategy::Symbolic),
            "copy" => Ok(LinkStrategy::Copy),
            "hard-or-copy" => Ok(LinkStrategy::HardOrCopy),
            _ => Err(format!("Unknown link strategy: {}", s)),
        }
    }
}
