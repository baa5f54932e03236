// Update packages: assembly, loading and application.
//
// - `entry`     : `FileEntry`, `FileEntryKind`, archive naming and sidecars
// - `hash`      : `ContentHash` (SHA-256) and `ContentHashIndex`
// - `writer`    : gzip-compressed tar writer shared by the assembler
// - `assembler` : walks old/new trees and classifies each file
// - `loader`    : parses an archive back into typed entries
// - `applier`   : materializes the new tree from an old tree plus a package

pub mod applier;
pub mod assembler;
pub mod entry;
pub mod hash;
pub mod loader;
pub mod writer;

use std::io;

pub use applier::{ApplyStats, apply_package};
pub use assembler::{AssembleStats, PackageAssembler};
pub use entry::{FileEntry, FileEntryKind, Sidecar};
pub use hash::{ContentHash, ContentHashIndex};
pub use loader::{Package, PackageLoader};
pub use writer::ArchiveWriter;

use crate::bsdiff::PatchError;

/// Package format version written by this crate.
pub const CURRENT_FORMAT_VERSION: u32 = 2;

/// First format version whose clients understand `.moved` entries.
pub const MOVES_FORMAT_VERSION: u32 = 2;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Package build configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageOptions {
    /// Format version of the clients the package targets.
    pub format_version: u32,
    /// Emit `.moved` entries for renamed files when the format allows it.
    pub detect_moves: bool,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            detect_moves: true,
        }
    }
}

impl PackageOptions {
    pub fn moves_enabled(&self) -> bool {
        self.detect_moves && self.format_version >= MOVES_FORMAT_VERSION
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("entry `{0}` has no .shasum sidecar")]
    MissingSidecar(String),

    #[error("sidecar `{0}` has no content entry")]
    OrphanSidecar(String),

    #[error("invalid sidecar `{name}`: {reason}")]
    InvalidSidecar { name: String, reason: String },

    #[error("invalid archive entry `{name}`: {reason}")]
    InvalidEntry { name: String, reason: String },

    #[error("no codec registered for extension `{extension}` (entry `{path}`)")]
    UnknownCodec { path: String, extension: String },

    #[error("integrity check failed for `{path}`: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("failed to apply delta for `{path}`: {source}")]
    Patch {
        path: String,
        #[source]
        source: PatchError,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
