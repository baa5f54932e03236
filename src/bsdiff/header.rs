// Patch header: magic plus three sign-magnitude lengths (32 bytes).
//
//   0  magic                     (8)
//   8  compressed control length (8)
//  16  compressed diff length    (8)
//  24  new file size             (8)
//  32  control | diff | extra sections

use std::io::{self, Write};

use super::decoder::PatchError;
use super::offset::{self, OFFSET_LEN};

/// Magic for patches whose sections are zlib-compressed.
pub const MAGIC_ZLIB: [u8; 8] = *b"BSDIFF4Z";

/// Magic for patches whose sections are LZMA-compressed.
pub const MAGIC_LZMA: [u8; 8] = *b"BSDIFF4X";

/// Encoded header size.
pub const HEADER_LEN: usize = 8 + 3 * OFFSET_LEN;

/// Parsed patch header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchHeader {
    pub magic: [u8; 8],
    /// Compressed control section length.
    pub control_len: u64,
    /// Compressed diff section length.
    pub diff_len: u64,
    /// Size of the reconstructed file.
    pub new_size: u64,
}

impl PatchHeader {
    /// Encode the header to a writer.
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.magic)?;
        offset::write_offset(w, self.control_len as i64)?;
        offset::write_offset(w, self.diff_len as i64)?;
        offset::write_offset(w, self.new_size as i64)
    }

    /// Parse and validate the header at the start of `patch`.
    ///
    /// Only the fixed-size fields are checked here; whether the magic names a
    /// known block codec and whether the sections fit in the patch is checked
    /// by [`PatchHeader::sections`] and the decoder.
    pub fn parse(patch: &[u8]) -> Result<Self, PatchError> {
        if patch.len() < HEADER_LEN {
            return Err(PatchError::CorruptPatch(format!(
                "patch is {} bytes, shorter than the {HEADER_LEN}-byte header",
                patch.len()
            )));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&patch[..8]);

        let field = |i: usize| -> i64 {
            let start = 8 + i * OFFSET_LEN;
            let mut buf = [0u8; OFFSET_LEN];
            buf.copy_from_slice(&patch[start..start + OFFSET_LEN]);
            offset::decode(buf)
        };
        let control_len = field(0);
        let diff_len = field(1);
        let new_size = field(2);

        if control_len < 0 || diff_len < 0 || new_size < 0 {
            return Err(PatchError::CorruptPatch(format!(
                "negative header length (control={control_len}, diff={diff_len}, new={new_size})"
            )));
        }

        Ok(Self {
            magic,
            control_len: control_len as u64,
            diff_len: diff_len as u64,
            new_size: new_size as u64,
        })
    }

    /// Split `patch` into its compressed control, diff and extra sections.
    pub fn sections<'a>(&self, patch: &'a [u8]) -> Result<[&'a [u8]; 3], PatchError> {
        let body = patch.get(HEADER_LEN..).unwrap_or_default();
        let control_end = usize::try_from(self.control_len)
            .ok()
            .filter(|&n| n <= body.len());
        let diff_end = control_end.and_then(|c| {
            usize::try_from(self.diff_len)
                .ok()
                .and_then(|d| c.checked_add(d))
                .filter(|&n| n <= body.len())
        });
        match (control_end, diff_end) {
            (Some(c), Some(d)) => Ok([&body[..c], &body[c..d], &body[d..]]),
            _ => Err(PatchError::CorruptPatch(format!(
                "sections (control={}, diff={}) overrun the {}-byte patch body",
                self.control_len,
                self.diff_len,
                body.len()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PatchHeader {
        PatchHeader {
            magic: MAGIC_ZLIB,
            control_len: 10,
            diff_len: 4,
            new_size: 1000,
        }
    }

    #[test]
    fn encode_layout() {
        let mut buf = Vec::new();
        sample().encode(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(&buf[..8], b"BSDIFF4Z");
        assert_eq!(&buf[8..16], &offset::encode(10));
        assert_eq!(&buf[24..32], &offset::encode(1000));
        assert_eq!(PatchHeader::parse(&buf).unwrap(), sample());
    }

    #[test]
    fn short_patch_rejected() {
        assert!(matches!(
            PatchHeader::parse(b"BSDIFF4Z"),
            Err(PatchError::CorruptPatch(_))
        ));
    }

    #[test]
    fn negative_length_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC_ZLIB);
        buf.extend_from_slice(&offset::encode(-1));
        buf.extend_from_slice(&offset::encode(0));
        buf.extend_from_slice(&offset::encode(0));
        assert!(matches!(
            PatchHeader::parse(&buf),
            Err(PatchError::CorruptPatch(_))
        ));
    }

    #[test]
    fn sections_split_body() {
        let mut buf = Vec::new();
        sample().encode(&mut buf).unwrap();
        buf.extend(0u8..20);
        let [control, diff, extra] = sample().sections(&buf).unwrap();
        assert_eq!(control, &(0u8..10).collect::<Vec<_>>()[..]);
        assert_eq!(diff, &[10, 11, 12, 13]);
        assert_eq!(extra.len(), 6);
    }

    #[test]
    fn sections_overrun_rejected() {
        let mut buf = Vec::new();
        sample().encode(&mut buf).unwrap();
        buf.extend(0u8..12);
        assert!(sample().sections(&buf).is_err());
    }
}
