// Delta codec capability and the built-in bsdiff implementations.

use std::io::Write;

use crate::bsdiff::{self, DiffOptions, EncodeError, PatchError};
use crate::compress::block::BlockCompression;

/// Error raised by a codec while creating a delta.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("{0}")]
    Other(String),
}

/// A delta encoder/decoder pair that can take part in a delta race.
///
/// The extension names the archive entry suffix of deltas produced by this
/// codec, so it must be unique within a [`crate::delta::DeltaManager`].
///
/// Implementations report failure through `Err`; the race logs the error
/// and drops that candidate. A panic is not caught: it unwinds out of the
/// race and aborts the whole delta (and any package assembly driving it).
pub trait DeltaCodec: Send + Sync {
    /// Human-readable codec name, used in logs.
    fn name(&self) -> &str;

    /// Archive entry extension, without the leading dot.
    fn extension(&self) -> &str;

    /// Produce a delta turning `source` into `target`.
    ///
    /// Must not panic on any input; internal failures become `Err`.
    fn create_delta(&self, source: &[u8], target: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Apply a delta produced by [`DeltaCodec::create_delta`] to `source`.
    ///
    /// Returns the number of bytes written.
    fn apply_delta(
        &self,
        source: &[u8],
        delta: &[u8],
        output: &mut dyn Write,
    ) -> Result<u64, PatchError>;
}

// ---------------------------------------------------------------------------
// bsdiff codecs
// ---------------------------------------------------------------------------

/// bsdiff with a fixed block compression.
#[derive(Debug, Clone)]
pub struct BsdiffCodec {
    name: String,
    extension: String,
    options: DiffOptions,
}

impl BsdiffCodec {
    pub fn new(name: impl Into<String>, extension: impl Into<String>, options: DiffOptions) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
            options,
        }
    }

    /// bsdiff with zlib sections, archived as `.bsdiff`.
    pub fn zlib() -> Self {
        Self::new(
            "bsdiff",
            "bsdiff",
            DiffOptions {
                compression: BlockCompression::Zlib { level: 9 },
            },
        )
    }

    /// bsdiff with LZMA sections, archived as `.xbsdiff`.
    #[cfg(feature = "lzma")]
    pub fn lzma() -> Self {
        Self::new(
            "bsdiff-lzma",
            "xbsdiff",
            DiffOptions {
                compression: BlockCompression::Lzma,
            },
        )
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }
}

impl DeltaCodec for BsdiffCodec {
    fn name(&self) -> &str {
        &self.name
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    fn create_delta(&self, source: &[u8], target: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bsdiff::encode(source, target, &self.options)?)
    }

    fn apply_delta(
        &self,
        source: &[u8],
        delta: &[u8],
        mut output: &mut dyn Write,
    ) -> Result<u64, PatchError> {
        bsdiff::decode(source, delta, &mut output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(codec: &dyn DeltaCodec) {
        let source = b"version 1.0.0 of the application binary".repeat(8);
        let mut target = source.clone();
        target[8..13].copy_from_slice(b"2.1.0");
        let delta = codec.create_delta(&source, &target).unwrap();
        let mut out = Vec::new();
        let n = codec.apply_delta(&source, &delta, &mut out).unwrap();
        assert_eq!(n, target.len() as u64);
        assert_eq!(out, target);
    }

    #[test]
    fn zlib_codec_roundtrip() {
        let codec = BsdiffCodec::zlib();
        assert_eq!(codec.name(), "bsdiff");
        assert_eq!(codec.extension(), "bsdiff");
        roundtrip(&codec);
    }

    #[cfg(feature = "lzma")]
    #[test]
    fn lzma_codec_roundtrip() {
        let codec = BsdiffCodec::lzma();
        assert_eq!(codec.extension(), "xbsdiff");
        roundtrip(&codec);
    }

    #[test]
    fn apply_rejects_foreign_bytes() {
        let mut out = Vec::new();
        let err = BsdiffCodec::zlib()
            .apply_delta(b"source", b"definitely not a bsdiff patch", &mut out)
            .unwrap_err();
        assert!(err.is_corrupt_input());
    }
}
