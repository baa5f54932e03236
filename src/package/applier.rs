// Package application.
//
// Materializes every entry of a loaded package into an output directory,
// reading from the old tree where the entry kind needs it.  Each file is
// hashed as it is written and checked against its sidecar; a file that
// fails the check (or fails to materialize at all) is removed before the
// error is returned.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::entry::{FileEntry, FileEntryKind};
use super::hash::{ContentHash, HashingWriter};
use super::loader::Package;
use super::PackageError;
use crate::delta::DeltaManager;

const BUF_SIZE: usize = 64 * 1024;

/// Statistics returned by [`apply_package`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub new_files: u64,
    pub moved_files: u64,
    pub unchanged_files: u64,
    pub delta_files: u64,
    /// Total bytes written to the output directory.
    pub bytes_written: u64,
}

impl ApplyStats {
    pub fn files(&self) -> u64 {
        self.new_files + self.moved_files + self.unchanged_files + self.delta_files
    }
}

/// Write the new tree described by `package` into `output_dir`.
///
/// `old_tree` is required unless the package is full.  `manager` resolves
/// delta entries to their codec by extension.
pub fn apply_package(
    package: &Package,
    old_tree: Option<&Path>,
    output_dir: &Path,
    manager: &DeltaManager,
) -> Result<ApplyStats, PackageError> {
    if let Some(old) = old_tree
        && same_dir(old, output_dir)
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "output directory must differ from the old tree",
        )
        .into());
    }

    fs::create_dir_all(output_dir)?;
    let mut stats = ApplyStats::default();

    for entry in package.entries() {
        let target = output_path(output_dir, &entry.path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let written = materialize(entry, old_tree, &target, manager)
            .and_then(|(hash, size)| verify(entry, hash, size).map(|()| size));
        let written = match written {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&target);
                return Err(e);
            }
        };

        debug!("apply: {} ({}, {written} bytes)", entry.path, entry.kind.label());
        match entry.kind {
            FileEntryKind::New => stats.new_files += 1,
            FileEntryKind::Moved { .. } => stats.moved_files += 1,
            FileEntryKind::Unchanged => stats.unchanged_files += 1,
            FileEntryKind::Delta { .. } => stats.delta_files += 1,
        }
        stats.bytes_written += written;
    }

    info!(
        "apply: {} files, {} bytes into {}",
        stats.files(),
        stats.bytes_written,
        output_dir.display()
    );
    Ok(stats)
}

/// Write one entry to `target`, returning the hash and size of what was
/// written.
fn materialize(
    entry: &FileEntry,
    old_tree: Option<&Path>,
    target: &Path,
    manager: &DeltaManager,
) -> Result<(ContentHash, u64), PackageError> {
    let old_file = |rel: &str| -> Result<PathBuf, PackageError> {
        let root = old_tree.ok_or_else(|| PackageError::InvalidEntry {
            name: entry.archive_name(),
            reason: "entry needs an old tree to apply".to_string(),
        })?;
        Ok(output_path(root, rel))
    };

    let file = File::create(target)?;
    let mut out = HashingWriter::new(BufWriter::with_capacity(BUF_SIZE, file));

    match &entry.kind {
        FileEntryKind::New => out.write_all(entry.body())?,
        FileEntryKind::Moved { previous } => {
            copy_from(&old_file(previous)?, &mut out)?;
        }
        FileEntryKind::Unchanged => {
            copy_from(&old_file(&entry.path)?, &mut out)?;
        }
        FileEntryKind::Delta { extension } => {
            let codec = manager
                .codec_for_extension(extension)
                .ok_or_else(|| PackageError::UnknownCodec {
                    path: entry.path.clone(),
                    extension: extension.clone(),
                })?;
            let source = fs::read(old_file(&entry.path)?)?;
            codec
                .apply_delta(&source, entry.body(), &mut out)
                .map_err(|source| PackageError::Patch {
                    path: entry.path.clone(),
                    source,
                })?;
        }
    }

    out.flush()?;
    let (_, hash, size) = out.finish();
    Ok((hash, size))
}

fn copy_from<W: Write>(path: &Path, out: &mut W) -> io::Result<u64> {
    let mut reader = BufReader::with_capacity(BUF_SIZE, File::open(path)?);
    io::copy(&mut reader, out)
}

/// Compare a materialized file with its sidecar.  Unchanged markers carry
/// size 0, so only their hash is checked.
fn verify(entry: &FileEntry, hash: ContentHash, size: u64) -> Result<(), PackageError> {
    let size_ok = entry.kind == FileEntryKind::Unchanged || size == entry.size;
    if hash == entry.hash && size_ok {
        return Ok(());
    }
    Err(PackageError::IntegrityMismatch {
        path: entry.path.clone(),
        expected: entry.sidecar().to_string(),
        actual: format!("{hash} {size}"),
    })
}

fn output_path(root: &Path, rel: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    path.extend(rel.split('/'));
    path
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
