// File-level I/O helpers for patch creation and application.
//
// Provides `diff_file()` and `patch_file()` convenience functions that wrap
// the bsdiff codec with buffered I/O and streaming SHA-256 checksums of the
// files involved.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::debug;

use crate::bsdiff::{self, DiffOptions, EncodeError, PatchError};
use crate::package::hash::{ContentHash, HashingWriter};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `diff_file()`.
#[derive(Debug, Clone)]
pub struct DiffStats {
    /// Old file size in bytes.
    pub old_size: u64,
    /// New file size in bytes.
    pub new_size: u64,
    /// Patch size in bytes.
    pub patch_size: u64,
    pub old_sha256: ContentHash,
    pub new_sha256: ContentHash,
}

/// Statistics returned by `patch_file()`.
#[derive(Debug, Clone)]
pub struct PatchStats {
    /// Old file size in bytes.
    pub old_size: u64,
    /// Patch size in bytes.
    pub patch_size: u64,
    /// Reconstructed output size in bytes.
    pub output_size: u64,
    /// Number of control triples applied.
    pub triples: u64,
    /// SHA-256 of the reconstructed output.
    pub output_sha256: ContentHash,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("patch error: {0}")]
    Patch(#[from] PatchError),
}

// ---------------------------------------------------------------------------
// Default buffer size
// ---------------------------------------------------------------------------

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// diff_file
// ---------------------------------------------------------------------------

/// Create a patch turning `old_path` into `new_path`, written to `patch_path`.
///
/// Both inputs are read fully into memory.  A partially written patch is
/// removed on failure.
pub fn diff_file(
    old_path: &Path,
    new_path: &Path,
    patch_path: &Path,
    opts: &DiffOptions,
) -> Result<DiffStats, FileError> {
    let old = fs::read(old_path)?;
    let new = fs::read(new_path)?;

    let file = File::create(patch_path)?;
    let mut writer = BufWriter::with_capacity(BUF_SIZE, file);
    let result = bsdiff::encode_to(&old, &new, &mut writer, opts).and_then(|n| {
        writer.flush()?;
        Ok(n)
    });
    let patch_size = match result {
        Ok(n) => n,
        Err(e) => {
            drop(writer);
            let _ = fs::remove_file(patch_path);
            return Err(e.into());
        }
    };

    debug!(
        "diff_file: {} -> {} ({patch_size} byte patch)",
        old_path.display(),
        new_path.display()
    );

    Ok(DiffStats {
        old_size: old.len() as u64,
        new_size: new.len() as u64,
        patch_size,
        old_sha256: ContentHash::of(&old),
        new_sha256: ContentHash::of(&new),
    })
}

// ---------------------------------------------------------------------------
// patch_file
// ---------------------------------------------------------------------------

/// Apply the patch at `patch_path` to `old_path`, writing to `output_path`.
///
/// The output is hashed as it is written.  On failure the partially written
/// output is removed.
pub fn patch_file(
    old_path: &Path,
    patch_path: &Path,
    output_path: &Path,
) -> Result<PatchStats, FileError> {
    let old = fs::read(old_path)?;
    let patch = fs::read(patch_path)?;

    let file = File::create(output_path)?;
    let mut writer = HashingWriter::new(BufWriter::with_capacity(BUF_SIZE, file));

    let result = run_patch(&old, &patch, &mut writer);
    let triples = match result {
        Ok(triples) => triples,
        Err(e) => {
            drop(writer);
            let _ = fs::remove_file(output_path);
            return Err(e);
        }
    };
    let (_, output_sha256, output_size) = writer.finish();

    Ok(PatchStats {
        old_size: old.len() as u64,
        patch_size: patch.len() as u64,
        output_size,
        triples,
        output_sha256,
    })
}

fn run_patch<W: Write>(old: &[u8], patch: &[u8], writer: &mut W) -> Result<u64, FileError> {
    let mut decoder = bsdiff::PatchDecoder::new(old, patch)?;
    decoder.decode_to(writer)?;
    writer.flush()?;
    Ok(decoder.triples_applied())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn diff_patch_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let old_data = b"The quick brown fox jumps over the lazy dog. 1234567890";
        let new_data = b"The quick brown cat sits on the lazy mat. 1234567890!!!";

        let old_path = write_file(dir.path(), "old.bin", old_data);
        let new_path = write_file(dir.path(), "new.bin", new_data);
        let patch_path = dir.path().join("p.bsdiff");
        let output_path = dir.path().join("out.bin");

        let diff = diff_file(&old_path, &new_path, &patch_path, &DiffOptions::default()).unwrap();
        assert_eq!(diff.old_size, old_data.len() as u64);
        assert_eq!(diff.new_size, new_data.len() as u64);
        assert_eq!(diff.patch_size, fs::metadata(&patch_path).unwrap().len());

        let stats = patch_file(&old_path, &patch_path, &output_path).unwrap();
        assert_eq!(stats.output_size, new_data.len() as u64);
        assert!(stats.triples >= 1);
        assert_eq!(stats.output_sha256, diff.new_sha256);
        assert_eq!(fs::read(&output_path).unwrap(), new_data);
    }

    #[test]
    fn empty_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let old_path = write_file(dir.path(), "old.bin", b"");
        let new_path = write_file(dir.path(), "new.bin", b"standalone data without any old file");
        let patch_path = dir.path().join("p.bsdiff");
        let output_path = dir.path().join("out.bin");

        diff_file(&old_path, &new_path, &patch_path, &DiffOptions::default()).unwrap();
        patch_file(&old_path, &patch_path, &output_path).unwrap();
        assert_eq!(
            fs::read(&output_path).unwrap(),
            b"standalone data without any old file"
        );
    }

    #[test]
    fn corrupt_patch_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let old_path = write_file(dir.path(), "old.bin", b"old");
        let patch_path = write_file(dir.path(), "p.bsdiff", &[0u8; 64]);
        let output_path = dir.path().join("out.bin");

        let err = patch_file(&old_path, &patch_path, &output_path).unwrap_err();
        assert!(matches!(err, FileError::Patch(PatchError::InvalidMagic { .. })));
        assert!(!output_path.exists());
    }

    #[test]
    fn missing_input_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = diff_file(
            &dir.path().join("nope"),
            &dir.path().join("nope2"),
            &dir.path().join("p"),
            &DiffOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FileError::Io(_)));
    }
}
