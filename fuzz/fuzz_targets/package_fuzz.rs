#![no_main]
use libfuzzer_sys::fuzz_target;
use deltapack::package::PackageLoader;

fuzz_target!(|data: &[u8]| {
    // Malformed archives are rejected with an error.
    let _ = PackageLoader::read(data);
});
