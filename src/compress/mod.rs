// Section compression for patches.
//
// - `block` : pluggable block codecs (Zlib, LZMA) keyed by patch magic

pub mod block;

pub use block::{BlockCodec, BlockCompression, backend_for_magic};
