// Content hashing for package entries.
//
// `ContentHash` is a SHA-256 digest rendered as 64 lowercase hex characters.
// `ContentHashIndex` maps a digest to every old-tree path carrying it and is
// the lookup table for move detection.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::str::FromStr;

use sha2::{Digest, Sha256};

const BUF_SIZE: usize = 64 * 1024;

/// SHA-256 digest of a file's contents.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash an in-memory buffer.
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Stream a file through SHA-256.  Returns the digest and the number of
    /// bytes hashed.
    pub fn of_file(path: &Path) -> io::Result<(Self, u64)> {
        let mut reader = BufReader::with_capacity(BUF_SIZE, File::open(path)?);
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; BUF_SIZE];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
        }
        Ok((Self(hasher.finalize().into()), total))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

impl FromStr for ContentHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

// ---------------------------------------------------------------------------
// Hashing writer
// ---------------------------------------------------------------------------

/// Writer adapter that hashes and counts everything written through it.
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Consume the adapter, returning the inner writer, digest and byte count.
    pub fn finish(self) -> (W, ContentHash, u64) {
        (self.inner, ContentHash(self.hasher.finalize().into()), self.written)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// ContentHashIndex
// ---------------------------------------------------------------------------

/// Content hash -> old-tree relative paths with that content.
///
/// Paths per hash are kept sorted, so [`ContentHashIndex::first`] is
/// deterministic regardless of insertion order.
#[derive(Debug, Default, Clone)]
pub struct ContentHashIndex {
    map: BTreeMap<ContentHash, Vec<String>>,
}

impl ContentHashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, hash: ContentHash, path: impl Into<String>) {
        let path = path.into();
        let paths = self.map.entry(hash).or_default();
        if let Err(pos) = paths.binary_search(&path) {
            paths.insert(pos, path);
        }
    }

    /// All paths carrying `hash`, sorted.
    pub fn get(&self, hash: &ContentHash) -> &[String] {
        self.map.get(hash).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The lexicographically first path carrying `hash`.
    pub fn first(&self, hash: &ContentHash) -> Option<&str> {
        self.get(hash).first().map(String::as_str)
    }

    /// Number of distinct hashes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
