// Package loading.
//
// Reads every archive entry, pairs each content entry with its `.shasum`
// sidecar and decides its `FileEntryKind` from the suffix.  Structural
// problems (unpaired entries, unsafe paths, malformed sidecars) are reported
// here so the applier only sees well-formed packages.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use log::debug;
use tar::{Archive, EntryType};

use super::PackageError;
use super::entry::{
    FileEntry, FileEntryKind, MOVED_SUFFIX, NEW_SUFFIX, SHASUM_SUFFIX, Sidecar,
    UNCHANGED_SUFFIX, check_relative, split_archive_name,
};

/// A loaded package: entries sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    entries: Vec<FileEntry>,
}

impl Package {
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<FileEntry> {
        self.entries
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when every entry ships full content, i.e. no old tree is needed.
    pub fn is_full(&self) -> bool {
        self.entries.iter().all(|e| e.kind == FileEntryKind::New)
    }

    pub fn new_files(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().filter(|e| e.kind == FileEntryKind::New)
    }

    pub fn moved_files(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.kind, FileEntryKind::Moved { .. }))
    }

    pub fn unchanged_files(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries
            .iter()
            .filter(|e| e.kind == FileEntryKind::Unchanged)
    }

    pub fn delta_files(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.kind, FileEntryKind::Delta { .. }))
    }
}

/// Reads package archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageLoader;

impl PackageLoader {
    pub fn load(path: &Path) -> Result<Package, PackageError> {
        let file = File::open(path)?;
        let package = Self::read(BufReader::new(file))?;
        debug!("load: {} entries from {}", package.len(), path.display());
        Ok(package)
    }

    /// Parse a gzip-compressed package archive from any reader.
    pub fn read<R: Read>(reader: R) -> Result<Package, PackageError> {
        let mut archive = Archive::new(GzDecoder::new(reader));
        let mut contents: BTreeMap<String, (String, String, Vec<u8>)> = BTreeMap::new();
        let mut sidecars: BTreeMap<String, (String, Sidecar)> = BTreeMap::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = std::str::from_utf8(&entry.path_bytes())
                .map_err(|_| invalid("<non UTF-8>", "entry name is not valid UTF-8"))?
                .to_string();

            match entry.header().entry_type() {
                EntryType::Regular | EntryType::Continuous => {}
                EntryType::Directory => continue,
                other => {
                    return Err(invalid(&name, &format!("unsupported entry type {other:?}")));
                }
            }

            let (path, suffix) =
                split_archive_name(&name).ok_or_else(|| invalid(&name, "missing suffix"))?;
            check_relative(path).map_err(|reason| invalid(&name, reason))?;
            let (path, suffix) = (path.to_string(), suffix.to_string());

            let mut body = Vec::new();
            entry.read_to_end(&mut body)?;

            if suffix == SHASUM_SUFFIX {
                let sidecar = Sidecar::parse(&name, &body)?;
                if sidecars.insert(path, (name.clone(), sidecar)).is_some() {
                    return Err(invalid(&name, "duplicate sidecar"));
                }
            } else if contents.contains_key(&path) {
                return Err(invalid(&name, "duplicate logical path"));
            } else {
                contents.insert(path, (name, suffix, body));
            }
        }

        let mut entries = Vec::with_capacity(contents.len());
        for (path, (name, suffix, body)) in contents {
            let Some((_, sidecar)) = sidecars.remove(&path) else {
                return Err(PackageError::MissingSidecar(name));
            };
            entries.push(build_entry(path, &name, &suffix, body, sidecar)?);
        }
        if let Some((name, _)) = sidecars.into_values().next() {
            return Err(PackageError::OrphanSidecar(name));
        }

        Ok(Package { entries })
    }
}

fn build_entry(
    path: String,
    name: &str,
    suffix: &str,
    body: Vec<u8>,
    sidecar: Sidecar,
) -> Result<FileEntry, PackageError> {
    let kind = match suffix {
        NEW_SUFFIX => {
            if body.len() as u64 != sidecar.size {
                return Err(invalid(name, "content size differs from sidecar"));
            }
            FileEntryKind::New
        }
        MOVED_SUFFIX => {
            let previous = std::str::from_utf8(&body)
                .map_err(|_| invalid(name, "previous path is not valid UTF-8"))?;
            check_relative(previous).map_err(|reason| invalid(name, reason))?;
            FileEntryKind::Moved {
                previous: previous.to_string(),
            }
        }
        UNCHANGED_SUFFIX => {
            if !body.is_empty() {
                return Err(invalid(name, "unchanged marker must be empty"));
            }
            FileEntryKind::Unchanged
        }
        extension => FileEntryKind::Delta {
            extension: extension.to_string(),
        },
    };

    let content = match kind {
        FileEntryKind::Unchanged => None,
        _ => Some(body),
    };
    Ok(FileEntry {
        path,
        size: sidecar.size,
        hash: sidecar.hash,
        kind,
        content,
    })
}

fn invalid(name: &str, reason: &str) -> PackageError {
    PackageError::InvalidEntry {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
