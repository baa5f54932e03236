// bsdiff-family binary diff/patch codec.
//
// # Modules
//
// - `offset`  : 8-byte sign-magnitude integer encoding
// - `header`  : 32-byte patch header and section layout
// - `suffix`  : suffix array construction (qsufsort) and longest-match search
// - `encoder` : match scan producing control/diff/extra sections
// - `decoder` : incremental patch application

pub mod decoder;
pub mod encoder;
pub mod header;
pub mod offset;
pub mod suffix;

pub use decoder::{PatchDecoder, PatchError, decode, decode_to_vec, read_control_block};
pub use encoder::{DiffOptions, EncodeError, encode, encode_to};
pub use header::{MAGIC_LZMA, MAGIC_ZLIB, PatchHeader};
pub use suffix::SuffixArray;

/// One reconstruction step of a patch.
///
/// Copy `copy_len` bytes of old data (plus diff bytes), append `extra_len`
/// literal bytes, then move the old cursor by `seek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlTriple {
    pub copy_len: i64,
    pub extra_len: i64,
    pub seek: i64,
}
