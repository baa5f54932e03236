// Package assembly.
//
// Walks the new tree (and optionally the old tree), decides the kind of
// every new-tree file exactly once, and streams the resulting entries into
// an archive.  Classification for a path present in both trees:
//
//   same hash                         -> Unchanged
//   content found elsewhere in old    -> Moved   (format version permitting)
//   delta race produced a winner      -> Delta
//   otherwise                         -> New
//
// Paths only in the new tree go through the move lookup and fall back to
// New.  Old-only paths are not recorded.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use super::entry::{FileEntry, FileEntryKind, check_relative};
use super::hash::{ContentHash, ContentHashIndex};
use super::writer::ArchiveWriter;
use super::{PackageError, PackageOptions};
use crate::delta::DeltaManager;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by [`PackageAssembler::assemble`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembleStats {
    pub new_files: u64,
    pub moved_files: u64,
    pub unchanged_files: u64,
    pub delta_files: u64,
    /// Total size of the new tree in bytes.
    pub tree_size: u64,
    /// Sum of content entry bodies written (before archive compression).
    pub payload_size: u64,
    /// Size of the finished archive, when written to a file.
    pub archive_size: u64,
}

impl AssembleStats {
    pub fn files(&self) -> u64 {
        self.new_files + self.moved_files + self.unchanged_files + self.delta_files
    }

    fn record(&mut self, entry: &FileEntry, file_size: u64) {
        match entry.kind {
            FileEntryKind::New => self.new_files += 1,
            FileEntryKind::Moved { .. } => self.moved_files += 1,
            FileEntryKind::Unchanged => self.unchanged_files += 1,
            FileEntryKind::Delta { .. } => self.delta_files += 1,
        }
        self.tree_size += file_size;
        self.payload_size += entry.body().len() as u64;
    }
}

// ---------------------------------------------------------------------------
// Tree scanning
// ---------------------------------------------------------------------------

/// A regular file found under a tree root.
#[derive(Debug, Clone)]
struct TreeFile {
    rel: String,
    abs: PathBuf,
}

/// Regular files under `root`, sorted by `/`-separated relative path.
/// Symlinks and other special files are skipped.
fn scan_tree(root: &Path) -> Result<Vec<TreeFile>, PackageError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            if !entry.file_type().is_dir() {
                warn!("assemble: skipping non-regular file {}", entry.path().display());
            }
            continue;
        }
        let rel = relative_name(root, entry.path())?;
        files.push(TreeFile {
            rel,
            abs: entry.into_path(),
        });
    }
    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(files)
}

fn relative_name(root: &Path, path: &Path) -> Result<String, PackageError> {
    let invalid = |reason: &str| PackageError::InvalidEntry {
        name: path.display().to_string(),
        reason: reason.to_string(),
    };
    let rel = path
        .strip_prefix(root)
        .map_err(|_| invalid("outside of the tree root"))?;
    let mut parts = Vec::new();
    for component in rel.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| invalid("file name is not valid UTF-8"))?;
        parts.push(part);
    }
    let rel = parts.join("/");
    check_relative(&rel).map_err(invalid)?;
    Ok(rel)
}

/// Hash of every old-tree file, keyed by relative path, plus the reverse
/// index used for move detection.
struct OldTree {
    root: PathBuf,
    hashes: BTreeMap<String, ContentHash>,
    index: ContentHashIndex,
}

impl OldTree {
    fn scan(root: &Path) -> Result<Self, PackageError> {
        let mut hashes = BTreeMap::new();
        let mut index = ContentHashIndex::new();
        for file in scan_tree(root)? {
            let (hash, _) = ContentHash::of_file(&file.abs)?;
            index.insert(hash, file.rel.clone());
            hashes.insert(file.rel, hash);
        }
        debug!(
            "assemble: indexed {} old files ({} distinct contents)",
            hashes.len(),
            index.len()
        );
        Ok(Self {
            root: root.to_path_buf(),
            hashes,
            index,
        })
    }
}

// ---------------------------------------------------------------------------
// PackageAssembler
// ---------------------------------------------------------------------------

/// Builds full and delta packages.
#[derive(Debug, Clone, Default)]
pub struct PackageAssembler {
    options: PackageOptions,
    manager: DeltaManager,
}

impl PackageAssembler {
    pub fn new(options: PackageOptions, manager: DeltaManager) -> Self {
        Self { options, manager }
    }

    pub fn options(&self) -> &PackageOptions {
        &self.options
    }

    pub fn manager(&self) -> &DeltaManager {
        &self.manager
    }

    /// Build a package at `output` describing `new_tree`.
    ///
    /// With `old_tree == None` every file is shipped in full.  A partially
    /// written archive is removed when assembly fails.
    pub fn assemble(
        &self,
        old_tree: Option<&Path>,
        new_tree: &Path,
        output: &Path,
    ) -> Result<AssembleStats, PackageError> {
        let writer = ArchiveWriter::create(output)?;
        let result = self
            .assemble_into(old_tree, new_tree, &writer)
            .and_then(|stats| {
                writer.finish()?;
                Ok(stats)
            });

        match result {
            Ok(mut stats) => {
                stats.archive_size = fs::metadata(output)?.len();
                info!(
                    "assemble: {} files ({} new, {} moved, {} unchanged, {} delta), {} -> {} bytes",
                    stats.files(),
                    stats.new_files,
                    stats.moved_files,
                    stats.unchanged_files,
                    stats.delta_files,
                    stats.tree_size,
                    stats.archive_size
                );
                Ok(stats)
            }
            Err(e) => {
                let _ = fs::remove_file(output);
                Err(e)
            }
        }
    }

    /// Classify `new_tree` and append every entry to `writer`.
    ///
    /// The caller finishes the writer.
    pub fn assemble_into<W: Write>(
        &self,
        old_tree: Option<&Path>,
        new_tree: &Path,
        writer: &ArchiveWriter<W>,
    ) -> Result<AssembleStats, PackageError> {
        let old = old_tree.map(OldTree::scan).transpose()?;
        let new_files = scan_tree(new_tree)?;
        info!(
            "assemble: {} package of {} files from {}",
            if old.is_some() { "delta" } else { "full" },
            new_files.len(),
            new_tree.display()
        );

        let mut stats = AssembleStats::default();
        for file in &new_files {
            let (entry, size) = match &old {
                None => {
                    let content = fs::read(&file.abs)?;
                    let size = content.len() as u64;
                    (FileEntry::new_file(file.rel.clone(), content), size)
                }
                Some(old) => self.classify(old, file)?,
            };
            debug!("assemble: {} -> {}", entry.path, entry.kind.label());
            writer.append_entry(&entry)?;
            stats.record(&entry, size);
        }
        Ok(stats)
    }

    /// Decide the entry for one new-tree file against the old tree.
    fn classify(&self, old: &OldTree, file: &TreeFile) -> Result<(FileEntry, u64), PackageError> {
        let (hash, size) = ContentHash::of_file(&file.abs)?;
        let previous_hash = old.hashes.get(&file.rel);

        if previous_hash == Some(&hash) {
            return Ok((FileEntry::unchanged(file.rel.clone(), hash), size));
        }

        if self.options.moves_enabled()
            && let Some(previous) = old.index.first(&hash)
        {
            return Ok((FileEntry::moved(file.rel.clone(), previous, hash, size), size));
        }

        let content = fs::read(&file.abs)?;
        if previous_hash.is_some() {
            let source = fs::read(old.root.join(&file.rel))?;
            let result = self.manager.create_delta_from_slices(&source, &content);
            if result.is_success() {
                return Ok((
                    FileEntry::delta(file.rel.clone(), result.extension, result.output, hash, size),
                    size,
                ));
            }
        }
        Ok((FileEntry::new_file(file.rel.clone(), content), size))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
