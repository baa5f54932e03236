#![no_main]
use libfuzzer_sys::fuzz_target;
use deltapack::bsdiff;

fuzz_target!(|data: &[u8]| {
    // Arbitrary patch bytes must only ever produce errors, never panics.
    let _ = bsdiff::decode_to_vec(&[], data);
    let _ = bsdiff::read_control_block(data);

    if data.len() >= 2 {
        let split = data.len() / 2;
        let (old, patch) = data.split_at(split);
        let _ = bsdiff::decode_to_vec(old, patch);
    }
});
