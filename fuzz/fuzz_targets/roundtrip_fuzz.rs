#![no_main]
use libfuzzer_sys::fuzz_target;
use deltapack::bsdiff::{self, DiffOptions};
use deltapack::compress::BlockCompression;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte picks the block compression and the split point.
    let flags = data[0];
    let payload = &data[1..];
    let split = payload.len() * (flags as usize & 0x7f) / 0x7f;
    let (old, new) = payload.split_at(split);

    let compression = if flags & 0x80 != 0 {
        BlockCompression::Lzma
    } else {
        BlockCompression::Zlib { level: 6 }
    };

    let patch = bsdiff::encode(old, new, &DiffOptions { compression }).unwrap();
    let decoded = bsdiff::decode_to_vec(old, &patch).unwrap();
    assert_eq!(decoded, new);
});
