// Archive writer: a gzip-compressed tar with deterministic headers.
//
// The builder is owned by a single `ArchiveWriter` behind a mutex.  Each
// logical file is appended as a content entry immediately followed by its
// sidecar, both under one lock acquisition, so the pair is never split.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use log::trace;
use parking_lot::Mutex;
use tar::{Builder, EntryType, Header, HeaderMode};

use super::entry::FileEntry;

const BUF_SIZE: usize = 64 * 1024;

type Inner<W> = Builder<GzEncoder<W>>;

/// Package archive under construction.
pub struct ArchiveWriter<W: Write = BufWriter<File>> {
    builder: Mutex<Inner<W>>,
}

impl ArchiveWriter<BufWriter<File>> {
    /// Create (or truncate) the archive at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::with_capacity(BUF_SIZE, file)))
    }
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(writer: W) -> Self {
        let encoder = GzEncoder::new(writer, Compression::default());
        let mut builder = Builder::new(encoder);
        builder.mode(HeaderMode::Deterministic);
        Self {
            builder: Mutex::new(builder),
        }
    }

    /// Append an entry's content and its sidecar.
    pub fn append_entry(&self, entry: &FileEntry) -> io::Result<()> {
        let sidecar = entry.sidecar().to_string();
        let mut builder = self.builder.lock();
        append_bytes(&mut builder, &entry.archive_name(), entry.body())?;
        append_bytes(&mut builder, &entry.sidecar_name(), sidecar.as_bytes())?;
        Ok(())
    }

    /// Write the tar trailer and the gzip footer, returning the inner writer.
    pub fn finish(self) -> io::Result<W> {
        let encoder = self.builder.into_inner().into_inner()?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        Ok(writer)
    }
}

fn append_bytes<W: Write>(builder: &mut Inner<W>, name: &str, body: &[u8]) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_size(body.len() as u64);
    // `append_data` sets the path (with GNU long-name support) and checksum.
    builder.append_data(&mut header, name, body)?;
    trace!("archive: {name} ({} bytes)", body.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
