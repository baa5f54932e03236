// bsdiff encoder.
//
// Scans the new file left to right, looking up the longest old-file match
// for every position through the suffix array.  A match is only taken once
// it beats the bytes that already agree at the previous offset by more than
// eight, so near-identical regions stay inside one control triple.  Each
// triple covers:
//   - `copy_len` bytes stored as (new - old) mod 256 in the diff section
//   - `extra_len` literal bytes in the extra section
//   - a signed seek of the old cursor to the next match

use std::io::Write;

use log::debug;

use crate::compress::block::BlockCompression;

use super::ControlTriple;
use super::header::PatchHeader;
use super::offset;
use super::suffix::SuffixArray;

/// A match must beat the carried-over agreement by more than this many
/// bytes before a new triple is started.
const MATCH_SLACK: isize = 8;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for patch encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Compression applied to the control, diff and extra sections.
    pub compression: BlockCompression,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Raw sections
// ---------------------------------------------------------------------------

/// Uncompressed patch sections produced by one scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sections {
    pub control: Vec<u8>,
    pub diff: Vec<u8>,
    pub extra: Vec<u8>,
}

impl Sections {
    fn push(&mut self, triple: ControlTriple) {
        for field in [triple.copy_len, triple.extra_len, triple.seek] {
            self.control.extend_from_slice(&offset::encode(field));
        }
    }
}

/// Run the match scan and return the uncompressed sections.
pub fn diff_sections(old: &[u8], new: &[u8]) -> Sections {
    let sa = SuffixArray::build(old);
    diff_sections_with(&sa, old, new)
}

/// Run the match scan against a prebuilt suffix array of `old`.
pub fn diff_sections_with(sa: &SuffixArray, old: &[u8], new: &[u8]) -> Sections {
    let mut out = Sections::default();
    let old_len = old.len() as isize;

    let mut scan = 0usize;
    let mut len = 0usize;
    let mut pos = 0usize;
    let mut last_scan = 0usize;
    let mut last_pos = 0usize;
    let mut last_offset = 0isize;

    // Whether `old[i + last_offset]` exists and equals `new[i]`.
    let agrees = |i: usize, last_offset: isize| -> bool {
        let o = i as isize + last_offset;
        o >= 0 && o < old_len && old[o as usize] == new[i]
    };

    while scan < new.len() {
        let mut old_score = 0isize;
        scan += len;
        let mut scsc = scan;

        while scan < new.len() {
            (pos, len) = sa.longest_match(old, &new[scan..]);

            while scsc < scan + len {
                if agrees(scsc, last_offset) {
                    old_score += 1;
                }
                scsc += 1;
            }

            let ilen = len as isize;
            if (ilen == old_score && len != 0) || ilen > old_score + MATCH_SLACK {
                break;
            }
            if agrees(scan, last_offset) {
                old_score -= 1;
            }
            scan += 1;
        }

        if len as isize == old_score && scan != new.len() {
            continue;
        }

        // Forward extension of the previous match.
        let mut lenf = 0usize;
        {
            let (mut s, mut best, mut i) = (0isize, 0isize, 0usize);
            while last_scan + i < scan && last_pos + i < old.len() {
                if old[last_pos + i] == new[last_scan + i] {
                    s += 1;
                }
                i += 1;
                if s * 2 - i as isize > best * 2 - lenf as isize {
                    best = s;
                    lenf = i;
                }
            }
        }

        // Backward extension of the new match.
        let mut lenb = 0usize;
        if scan < new.len() {
            let (mut s, mut best, mut i) = (0isize, 0isize, 1usize);
            while scan >= last_scan + i && pos >= i {
                if old[pos - i] == new[scan - i] {
                    s += 1;
                }
                if s * 2 - i as isize > best * 2 - lenb as isize {
                    best = s;
                    lenb = i;
                }
                i += 1;
            }
        }

        // The extensions overlap: pick the split point that keeps the most
        // agreeing bytes on the forward side. Strict `>` keeps the earliest.
        if last_scan + lenf > scan - lenb {
            let overlap = (last_scan + lenf) - (scan - lenb);
            let (mut s, mut best, mut lens) = (0isize, 0isize, 0usize);
            for i in 0..overlap {
                if new[last_scan + lenf - overlap + i] == old[last_pos + lenf - overlap + i] {
                    s += 1;
                }
                if new[scan - lenb + i] == old[pos - lenb + i] {
                    s -= 1;
                }
                if s > best {
                    best = s;
                    lens = i + 1;
                }
            }
            lenf = lenf + lens - overlap;
            lenb -= lens;
        }

        out.diff.extend(
            new[last_scan..last_scan + lenf]
                .iter()
                .zip(&old[last_pos..last_pos + lenf])
                .map(|(n, o)| n.wrapping_sub(*o)),
        );
        let extra_start = last_scan + lenf;
        let extra_len = (scan - lenb) - extra_start;
        out.extra
            .extend_from_slice(&new[extra_start..extra_start + extra_len]);

        out.push(ControlTriple {
            copy_len: lenf as i64,
            extra_len: extra_len as i64,
            seek: (pos as i64 - lenb as i64) - (last_pos + lenf) as i64,
        });

        last_scan = scan - lenb;
        last_pos = pos - lenb;
        last_offset = pos as isize - scan as isize;
    }

    out
}

// ---------------------------------------------------------------------------
// High-level encode
// ---------------------------------------------------------------------------

/// Encode a patch turning `old` into `new`.
pub fn encode(old: &[u8], new: &[u8], opts: &DiffOptions) -> Result<Vec<u8>, EncodeError> {
    let mut patch = Vec::new();
    encode_to(old, new, &mut patch, opts)?;
    Ok(patch)
}

/// Encode a patch turning `old` into `new`, writing it to `writer`.
///
/// Returns the number of patch bytes written.
pub fn encode_to<W: Write>(
    old: &[u8],
    new: &[u8],
    writer: &mut W,
    opts: &DiffOptions,
) -> Result<u64, EncodeError> {
    let sections = diff_sections(old, new);
    let backend = opts.compression.backend();

    let control = backend.compress(&sections.control)?;
    let diff = backend.compress(&sections.diff)?;
    let extra = backend.compress(&sections.extra)?;

    let header = PatchHeader {
        magic: backend.magic(),
        control_len: control.len() as u64,
        diff_len: diff.len() as u64,
        new_size: new.len() as u64,
    };
    header.encode(writer)?;
    writer.write_all(&control)?;
    writer.write_all(&diff)?;
    writer.write_all(&extra)?;

    let total = (super::header::HEADER_LEN + control.len() + diff.len() + extra.len()) as u64;
    debug!(
        "bsdiff: old={} new={} triples={} diff={} extra={} patch={} ({:?})",
        old.len(),
        new.len(),
        sections.control.len() / (3 * offset::OFFSET_LEN),
        sections.diff.len(),
        sections.extra.len(),
        total,
        opts.compression
    );
    Ok(total)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn triples(sections: &Sections) -> Vec<ControlTriple> {
        sections
            .control
            .chunks_exact(24)
            .map(|c| {
                let field = |i: usize| {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(&c[i * 8..i * 8 + 8]);
                    offset::decode(buf)
                };
                ControlTriple {
                    copy_len: field(0),
                    extra_len: field(1),
                    seek: field(2),
                }
            })
            .collect()
    }

    fn covered(triples: &[ControlTriple]) -> i64 {
        triples.iter().map(|t| t.copy_len + t.extra_len).sum()
    }

    #[test]
    fn empty_new_emits_nothing() {
        let s = diff_sections(b"old content", b"");
        assert!(s.control.is_empty());
        assert!(s.diff.is_empty());
        assert!(s.extra.is_empty());
    }

    #[test]
    fn empty_old_is_all_extra() {
        let s = diff_sections(b"", b"brand new");
        let t = triples(&s);
        assert_eq!(covered(&t), 9);
        assert_eq!(s.extra, b"brand new");
        assert!(t.iter().all(|t| t.copy_len == 0));
    }

    #[test]
    fn single_byte_change_is_one_copy() {
        let old = vec![0u8; 1000];
        let mut new = old.clone();
        new[500] = 0xFF;
        let s = diff_sections(&old, &new);
        let t = triples(&s);
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].copy_len, 1000);
        assert_eq!(t[0].extra_len, 0);
        assert_eq!(s.diff[500], 0xFF);
        assert_eq!(s.diff.iter().filter(|&&b| b != 0).count(), 1);
    }

    #[test]
    fn triples_cover_new_file() {
        let old = b"The quick brown fox jumps over the lazy dog. 0123456789".repeat(4);
        let mut new = old.clone();
        new.splice(30..30, b"INSERTED TEXT ".iter().copied());
        new.truncate(new.len() - 20);
        let s = diff_sections(&old, &new);
        let t = triples(&s);
        assert_eq!(covered(&t), new.len() as i64);
        assert_eq!(
            s.diff.len() as i64,
            t.iter().map(|t| t.copy_len).sum::<i64>()
        );
        assert_eq!(
            s.extra.len() as i64,
            t.iter().map(|t| t.extra_len).sum::<i64>()
        );
    }

    #[test]
    fn patch_starts_with_header() {
        let patch = encode(b"abc", b"abd", &DiffOptions::default()).unwrap();
        let header = PatchHeader::parse(&patch).unwrap();
        assert_eq!(header.magic, super::super::header::MAGIC_ZLIB);
        assert_eq!(header.new_size, 3);
    }

    #[test]
    fn encode_to_reports_written_bytes() {
        let mut out = Vec::new();
        let n = encode_to(b"hello", b"hello world", &mut out, &DiffOptions::default()).unwrap();
        assert_eq!(n, out.len() as u64);
    }
}
