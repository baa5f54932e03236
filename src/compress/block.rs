// Block compression for the three bsdiff patch sections.
//
// Every patch compresses its control, diff and extra sections with one block
// codec.  The codec is identified by the patch magic, so a decoder can pick
// the right decompressor from the header alone:
//   - Zlib (flate2)    magic "BSDIFF4Z"
//   - LZMA (lzma-rs)   magic "BSDIFF4X", feature-gated `lzma`

use std::io::{self, Read, Write};

use crate::bsdiff::decoder::PatchError;
use crate::bsdiff::header::MAGIC_ZLIB;
#[cfg(feature = "lzma")]
use crate::bsdiff::header::MAGIC_LZMA;

// ---------------------------------------------------------------------------
// BlockCodec trait
// ---------------------------------------------------------------------------

/// A compressor for one patch section.
///
/// `decompress` hands back a reader so the patch decoder can pull section
/// bytes incrementally instead of inflating everything up front.
pub trait BlockCodec: Send + Sync {
    /// Patch magic written for sections compressed with this codec.
    fn magic(&self) -> [u8; 8];

    /// Compress a whole section.
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    /// Open a decompressing reader over a compressed section.
    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Box<dyn Read + 'a>, PatchError>;
}

// ---------------------------------------------------------------------------
// Zlib backend
// ---------------------------------------------------------------------------

/// Zlib section codec (deflate with zlib framing and Adler-32 trailer).
#[derive(Debug, Clone, Copy)]
pub struct ZlibBlocks {
    level: flate2::Compression,
}

impl ZlibBlocks {
    /// Create a Zlib codec with the given compression level (0-9).
    pub fn new(level: u32) -> Self {
        Self {
            level: flate2::Compression::new(level.min(9)),
        }
    }
}

impl Default for ZlibBlocks {
    fn default() -> Self {
        Self::new(9)
    }
}

impl BlockCodec for ZlibBlocks {
    fn magic(&self) -> [u8; 8] {
        MAGIC_ZLIB
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Box<dyn Read + 'a>, PatchError> {
        Ok(Box::new(flate2::read::ZlibDecoder::new(data)))
    }
}

// ---------------------------------------------------------------------------
// LZMA backend
// ---------------------------------------------------------------------------

/// LZMA section codec. Slower than zlib, usually smaller on executables.
///
/// lzma-rs has no pull-based reader, so sections are inflated eagerly.
#[cfg(feature = "lzma")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LzmaBlocks;

#[cfg(feature = "lzma")]
impl BlockCodec for LzmaBlocks {
    fn magic(&self) -> [u8; 8] {
        MAGIC_LZMA
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut input = io::Cursor::new(data);
        let mut output = Vec::new();
        lzma_rs::lzma_compress(&mut input, &mut output)?;
        Ok(output)
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Box<dyn Read + 'a>, PatchError> {
        let mut input = io::BufReader::new(io::Cursor::new(data));
        let mut output = Vec::new();
        lzma_rs::lzma_decompress(&mut input, &mut output)
            .map_err(|e| PatchError::Decompression(format!("LZMA: {e}")))?;
        Ok(Box::new(io::Cursor::new(output)))
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Block compression used when encoding a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCompression {
    /// Zlib at the given level (0-9).
    Zlib { level: u32 },
    /// LZMA with lzma-rs defaults.
    #[cfg(feature = "lzma")]
    Lzma,
}

impl Default for BlockCompression {
    fn default() -> Self {
        Self::Zlib { level: 9 }
    }
}

impl BlockCompression {
    /// Return the codec implementation.
    pub fn backend(&self) -> Box<dyn BlockCodec> {
        match *self {
            Self::Zlib { level } => Box::new(ZlibBlocks::new(level)),
            #[cfg(feature = "lzma")]
            Self::Lzma => Box::new(LzmaBlocks),
        }
    }

    /// Magic signature written by this compression.
    pub fn magic(&self) -> [u8; 8] {
        self.backend().magic()
    }
}

/// Look up the decompressor for a patch magic.
///
/// Returns `None` for magics this build does not know.
pub fn backend_for_magic(magic: &[u8; 8]) -> Option<Box<dyn BlockCodec>> {
    match *magic {
        MAGIC_ZLIB => Some(Box::new(ZlibBlocks::default())),
        #[cfg(feature = "lzma")]
        MAGIC_LZMA => Some(Box::new(LzmaBlocks)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
