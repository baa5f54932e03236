// bsdiff patch decoder.
//
// Mirrors the encoder's section layout:
//   1. Read and validate the 32-byte header; the magic selects the block codec.
//   2. Open independent decompressing readers over control, diff and extra.
//   3. For every control triple: add diff bytes onto old bytes at the old
//      cursor, append literal extra bytes, then seek the old cursor.
//
// Output goes straight to a `Write` sink one bounded chunk at a time; the
// decoded file is never held in memory by the decoder itself.

use std::io::{self, Read, Write};

use log::{debug, trace};

use crate::compress::block::backend_for_magic;

use super::ControlTriple;
use super::header::PatchHeader;
use super::offset::{self, OFFSET_LEN};

/// Copy/extra phases move at most this many bytes per write.
const CHUNK: usize = 64 * 1024;

/// Upper bound for output preallocation in [`decode_to_vec`]; the declared
/// size comes from untrusted input.
const MAX_PREALLOC: u64 = 64 << 20;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Writing the reconstructed output failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("unknown patch magic {found:02X?}")]
    InvalidMagic { found: [u8; 8] },
    #[error("corrupt patch: {0}")]
    CorruptPatch(String),
    #[error("section decompression failed: {0}")]
    Decompression(String),
}

impl PatchError {
    /// Whether the patch itself is malformed (as opposed to an output error).
    pub fn is_corrupt_input(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// Map a failed section read: running dry is corruption, anything else came
/// from the block decompressor.
fn section_error(section: &str, e: io::Error) -> PatchError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        PatchError::CorruptPatch(format!("{section} section truncated"))
    } else {
        PatchError::Decompression(format!("{section} section: {e}"))
    }
}

// ---------------------------------------------------------------------------
// PatchDecoder
// ---------------------------------------------------------------------------

/// Incremental patch decoder.
///
/// Construction reads the header and opens the three section streams; each
/// [`PatchDecoder::step`] then applies one control triple.
pub struct PatchDecoder<'a> {
    old: &'a [u8],
    header: PatchHeader,
    control: Box<dyn Read + 'a>,
    diff: Box<dyn Read + 'a>,
    extra: Box<dyn Read + 'a>,
    old_pos: i64,
    new_pos: u64,
    triples: u64,
    buf: Vec<u8>,
}

impl<'a> PatchDecoder<'a> {
    /// Parse the header of `patch` and open its sections.
    pub fn new(old: &'a [u8], patch: &'a [u8]) -> Result<Self, PatchError> {
        let header = PatchHeader::parse(patch)?;
        let backend =
            backend_for_magic(&header.magic).ok_or(PatchError::InvalidMagic { found: header.magic })?;
        let [control, diff, extra] = header.sections(patch)?;

        debug!(
            "bspatch: old={} new={} control={} diff={} extra={}",
            old.len(),
            header.new_size,
            control.len(),
            diff.len(),
            extra.len()
        );

        Ok(Self {
            old,
            header,
            control: backend.decompress(control)?,
            diff: backend.decompress(diff)?,
            extra: backend.decompress(extra)?,
            old_pos: 0,
            new_pos: 0,
            triples: 0,
            buf: Vec::new(),
        })
    }

    /// The parsed patch header.
    pub fn header(&self) -> &PatchHeader {
        &self.header
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.new_pos
    }

    /// Control triples applied so far.
    pub fn triples_applied(&self) -> u64 {
        self.triples
    }

    /// Whether the declared new size has been reached.
    pub fn is_finished(&self) -> bool {
        self.new_pos >= self.header.new_size
    }

    /// Apply every remaining triple. Returns the total bytes written.
    pub fn decode_to<W: Write>(&mut self, writer: &mut W) -> Result<u64, PatchError> {
        while self.step(writer)?.is_some() {}
        Ok(self.new_pos)
    }

    /// Apply the next control triple.
    ///
    /// Returns `None` once the new file is complete.
    pub fn step<W: Write>(&mut self, writer: &mut W) -> Result<Option<ControlTriple>, PatchError> {
        if self.is_finished() {
            return Ok(None);
        }

        let triple = self.read_triple()?;
        trace!("bspatch: triple {} {:?}", self.triples, triple);
        if triple.copy_len < 0 || triple.extra_len < 0 {
            return Err(PatchError::CorruptPatch(format!(
                "negative length in control triple {}: {triple:?}",
                self.triples
            )));
        }

        self.check_room(triple.copy_len as u64)?;
        self.copy_phase(triple.copy_len as u64, writer)?;

        self.check_room(triple.extra_len as u64)?;
        self.extra_phase(triple.extra_len as u64, writer)?;

        self.old_pos = self.old_pos.checked_add(triple.seek).ok_or_else(|| {
            PatchError::CorruptPatch(format!("seek {} overflows the old cursor", triple.seek))
        })?;

        self.triples += 1;
        Ok(Some(triple))
    }

    fn read_triple(&mut self) -> Result<ControlTriple, PatchError> {
        let mut buf = [0u8; 3 * OFFSET_LEN];
        self.control.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                PatchError::CorruptPatch(format!(
                    "control section ended at {} of {} bytes",
                    self.new_pos, self.header.new_size
                ))
            } else {
                section_error("control", e)
            }
        })?;
        Ok(ControlTriple::from_bytes(&buf))
    }

    fn check_room(&self, len: u64) -> Result<(), PatchError> {
        match self.new_pos.checked_add(len) {
            Some(end) if end <= self.header.new_size => Ok(()),
            _ => Err(PatchError::CorruptPatch(format!(
                "triple {} writes {len} bytes at {} past declared size {}",
                self.triples, self.new_pos, self.header.new_size
            ))),
        }
    }

    fn copy_phase<W: Write>(&mut self, len: u64, writer: &mut W) -> Result<(), PatchError> {
        // The old cursor must stay representable for the whole copy.
        i64::try_from(len)
            .ok()
            .and_then(|l| self.old_pos.checked_add(l))
            .ok_or_else(|| {
                PatchError::CorruptPatch(format!(
                    "copy of {len} bytes at old offset {} overflows the old cursor",
                    self.old_pos
                ))
            })?;

        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(CHUNK as u64) as usize;
            self.buf.resize(n, 0);
            self.diff
                .read_exact(&mut self.buf)
                .map_err(|e| section_error("diff", e))?;

            // Old bytes outside the buffer contribute zero.
            for (i, b) in self.buf.iter_mut().enumerate() {
                let at = self.old_pos + i as i64;
                if at >= 0 && (at as u64) < self.old.len() as u64 {
                    *b = b.wrapping_add(self.old[at as usize]);
                }
            }

            writer.write_all(&self.buf)?;
            self.new_pos += n as u64;
            self.old_pos += n as i64;
            remaining -= n as u64;
        }
        Ok(())
    }

    fn extra_phase<W: Write>(&mut self, len: u64, writer: &mut W) -> Result<(), PatchError> {
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(CHUNK as u64) as usize;
            self.buf.resize(n, 0);
            self.extra
                .read_exact(&mut self.buf)
                .map_err(|e| section_error("extra", e))?;
            writer.write_all(&self.buf)?;
            self.new_pos += n as u64;
            remaining -= n as u64;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Convenience functions
// ---------------------------------------------------------------------------

/// Apply `patch` to `old`, writing the new file to `writer`.
///
/// Nothing is written when the header is invalid. Returns the number of
/// bytes written.
pub fn decode<W: Write>(old: &[u8], patch: &[u8], writer: &mut W) -> Result<u64, PatchError> {
    PatchDecoder::new(old, patch)?.decode_to(writer)
}

/// Apply `patch` to `old` in memory.
pub fn decode_to_vec(old: &[u8], patch: &[u8]) -> Result<Vec<u8>, PatchError> {
    let mut decoder = PatchDecoder::new(old, patch)?;
    let mut out = Vec::with_capacity(decoder.header().new_size.min(MAX_PREALLOC) as usize);
    decoder.decode_to(&mut out)?;
    Ok(out)
}

/// Parse the header and every control triple of `patch` without applying it.
pub fn read_control_block(patch: &[u8]) -> Result<(PatchHeader, Vec<ControlTriple>), PatchError> {
    let header = PatchHeader::parse(patch)?;
    let backend =
        backend_for_magic(&header.magic).ok_or(PatchError::InvalidMagic { found: header.magic })?;
    let [control, _, _] = header.sections(patch)?;

    let mut raw = Vec::new();
    backend
        .decompress(control)?
        .read_to_end(&mut raw)
        .map_err(|e| section_error("control", e))?;

    let triple_len = 3 * OFFSET_LEN;
    if raw.len() % triple_len != 0 {
        return Err(PatchError::CorruptPatch(format!(
            "control section of {} bytes is not a whole number of triples",
            raw.len()
        )));
    }
    let triples = raw
        .chunks_exact(triple_len)
        .map(ControlTriple::from_bytes)
        .collect();
    Ok((header, triples))
}

impl ControlTriple {
    /// Decode a triple from its 24-byte control-section form.
    pub(crate) fn from_bytes(buf: &[u8]) -> Self {
        let field = |i: usize| {
            let mut b = [0u8; OFFSET_LEN];
            b.copy_from_slice(&buf[i * OFFSET_LEN..(i + 1) * OFFSET_LEN]);
            offset::decode(b)
        };
        Self {
            copy_len: field(0),
            extra_len: field(1),
            seek: field(2),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
