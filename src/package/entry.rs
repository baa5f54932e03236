// Package entries and their archive naming.
//
// One logical file becomes two archive entries sharing a base name: the
// content entry `<path>.<suffix>` and the sidecar `<path>.shasum` holding
// `"<hex-sha256> <size>"`.

use std::fmt;

use super::PackageError;
use super::hash::ContentHash;

/// Full file content.
pub const NEW_SUFFIX: &str = "new";
/// Body holds the previous relative path.
pub const MOVED_SUFFIX: &str = "moved";
/// Zero-byte marker for a file identical to the old tree.
pub const UNCHANGED_SUFFIX: &str = "diff";
/// Hash/size sidecar.
pub const SHASUM_SUFFIX: &str = "shasum";

/// Suffixes a delta codec may not claim.
pub const RESERVED_SUFFIXES: [&str; 4] =
    [NEW_SUFFIX, MOVED_SUFFIX, UNCHANGED_SUFFIX, SHASUM_SUFFIX];

/// How a file is materialized on the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEntryKind {
    /// Shipped in full.
    New,
    /// Same content as `previous` in the old tree.
    Moved { previous: String },
    /// Same content at the same path in the old tree.
    Unchanged,
    /// Delta against the same path in the old tree, produced by the codec
    /// owning `extension`.
    Delta { extension: String },
}

impl FileEntryKind {
    /// Archive suffix of the content entry.
    pub fn suffix(&self) -> &str {
        match self {
            Self::New => NEW_SUFFIX,
            Self::Moved { .. } => MOVED_SUFFIX,
            Self::Unchanged => UNCHANGED_SUFFIX,
            Self::Delta { extension } => extension,
        }
    }

    /// Short label for logs and inspection output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Moved { .. } => "moved",
            Self::Unchanged => "unchanged",
            Self::Delta { .. } => "delta",
        }
    }
}

/// One logical file in a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Relative path, `/`-separated.
    pub path: String,
    /// Size recorded in the sidecar (0 for unchanged markers).
    pub size: u64,
    /// Hash of the file as materialized.
    pub hash: ContentHash,
    pub kind: FileEntryKind,
    /// Content entry body: file bytes, delta bytes, or the previous path.
    pub content: Option<Vec<u8>>,
}

impl FileEntry {
    pub fn new_file(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            size: content.len() as u64,
            hash: ContentHash::of(&content),
            kind: FileEntryKind::New,
            content: Some(content),
        }
    }

    pub fn moved(path: impl Into<String>, previous: impl Into<String>, hash: ContentHash, size: u64) -> Self {
        let previous = previous.into();
        Self {
            path: path.into(),
            size,
            hash,
            content: Some(previous.as_bytes().to_vec()),
            kind: FileEntryKind::Moved { previous },
        }
    }

    pub fn unchanged(path: impl Into<String>, hash: ContentHash) -> Self {
        Self {
            path: path.into(),
            size: 0,
            hash,
            kind: FileEntryKind::Unchanged,
            content: None,
        }
    }

    pub fn delta(
        path: impl Into<String>,
        extension: impl Into<String>,
        delta: Vec<u8>,
        hash: ContentHash,
        size: u64,
    ) -> Self {
        Self {
            path: path.into(),
            size,
            hash,
            kind: FileEntryKind::Delta {
                extension: extension.into(),
            },
            content: Some(delta),
        }
    }

    /// Name of the content entry in the archive.
    pub fn archive_name(&self) -> String {
        format!("{}.{}", self.path, self.kind.suffix())
    }

    /// Name of the sidecar entry in the archive.
    pub fn sidecar_name(&self) -> String {
        format!("{}.{SHASUM_SUFFIX}", self.path)
    }

    pub fn sidecar(&self) -> Sidecar {
        Sidecar {
            hash: self.hash,
            size: self.size,
        }
    }

    /// Content entry body as written to the archive.
    pub fn body(&self) -> &[u8] {
        self.content.as_deref().unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Sidecar
// ---------------------------------------------------------------------------

/// Parsed `.shasum` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sidecar {
    pub hash: ContentHash,
    pub size: u64,
}

impl Sidecar {
    pub fn parse(name: &str, body: &[u8]) -> Result<Self, PackageError> {
        let invalid = |reason: &str| PackageError::InvalidSidecar {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        let text = std::str::from_utf8(body).map_err(|_| invalid("not UTF-8"))?;
        let mut fields = text.split_ascii_whitespace();
        let (Some(hash), Some(size), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(invalid("expected `<hash> <size>`"));
        };
        let hash = hash
            .parse::<ContentHash>()
            .map_err(|_| invalid("hash is not 64 hex characters"))?;
        let size = size
            .parse::<u64>()
            .map_err(|_| invalid("size is not a decimal integer"))?;
        Ok(Self { hash, size })
    }
}

impl fmt::Display for Sidecar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.hash, self.size)
    }
}

/// Split an archive entry name into `(relative path, suffix)`.
///
/// The suffix is everything after the last dot of the final path component.
pub fn split_archive_name(name: &str) -> Option<(&str, &str)> {
    let file_start = name.rfind('/').map_or(0, |i| i + 1);
    let dot = name[file_start..].rfind('.')? + file_start;
    let (path, suffix) = (&name[..dot], &name[dot + 1..]);
    if path.len() == file_start || suffix.is_empty() {
        return None;
    }
    Some((path, suffix))
}

/// Reject relative paths that could escape an output directory or that
/// would not survive the archive layout.
pub(crate) fn check_relative(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("empty path");
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err("path must be relative and `/`-separated");
    }
    if path
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err("path contains empty, `.` or `..` components");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
