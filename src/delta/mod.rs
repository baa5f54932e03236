// Delta selection: interchangeable encoders behind one capability.
//
// - `codec`   : `DeltaCodec` trait and the built-in bsdiff codecs
// - `manager` : `DeltaManager`: races every registered codec and keeps the
//               smallest useful result

pub mod codec;
pub mod manager;

pub use codec::{BsdiffCodec, CodecError, DeltaCodec};
pub use manager::{DeltaManager, RegistryError};

/// One codec's attempt at a delta for a (source, target) pair.
///
/// Unsuccessful results carry no output. [`DeltaCandidateResult::failed`]
/// is also what the manager hands back when no codec produced a delta worth
/// shipping, so callers fall back to the full file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaCandidateResult {
    /// Name of the codec that produced this result (empty for `failed()`).
    pub codec: String,
    /// Archive extension of the codec (empty for `failed()`).
    pub extension: String,
    pub output: Vec<u8>,
    pub success: bool,
}

impl DeltaCandidateResult {
    /// The "no viable delta" sentinel.
    pub fn failed() -> Self {
        Self {
            codec: String::new(),
            extension: String::new(),
            output: Vec::new(),
            success: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Size of the delta in bytes.
    pub fn len(&self) -> usize {
        self.output.len()
    }

    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }
}
