use deltapack::bsdiff::{self, ControlTriple, DiffOptions, MAGIC_ZLIB, PatchDecoder, PatchError};
use deltapack::compress::BlockCompression;

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed;
    (0..size)
        .map(|_| {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (s >> 33) as u8
        })
        .collect()
}

fn roundtrip(old: &[u8], new: &[u8], compression: BlockCompression) -> Vec<u8> {
    let patch = bsdiff::encode(old, new, &DiffOptions { compression }).unwrap();
    let decoded = bsdiff::decode_to_vec(old, &patch).unwrap();
    assert_eq!(decoded, new);
    patch
}

#[test]
fn single_byte_change_is_one_copy() {
    let old = vec![0u8; 1000];
    let mut new = old.clone();
    new[500] = 0xFF;

    let patch = roundtrip(&old, &new, BlockCompression::default());
    let (header, triples) = bsdiff::read_control_block(&patch).unwrap();
    assert_eq!(header.magic, MAGIC_ZLIB);
    assert_eq!(header.new_size, 1000);
    assert_eq!(triples.len(), 1);
    assert_eq!(triples[0].copy_len, 1000);
    assert_eq!(triples[0].extra_len, 0);
}

#[test]
fn empty_inputs() {
    roundtrip(b"", b"", BlockCompression::default());
    roundtrip(b"", b"fresh content", BlockCompression::default());
    roundtrip(b"old content that disappears", b"", BlockCompression::default());
}

#[test]
fn identical_files_compress_well() {
    let data = gen_data(256 * 1024, 7);
    let patch = roundtrip(&data, &data, BlockCompression::default());
    assert!(patch.len() < 1024, "patch={}", patch.len());
}

#[test]
fn insertions_and_deletions() {
    let old = gen_data(64 * 1024, 11);
    let mut new = old.clone();
    new.splice(1000..1000, b"inserted block of text".iter().copied());
    new.drain(30_000..31_000);
    new.extend_from_slice(b"trailer");
    let patch = roundtrip(&old, &new, BlockCompression::default());
    assert!(patch.len() < new.len() / 10, "patch={}", patch.len());
}

#[test]
fn reordered_blocks() {
    let a = gen_data(8192, 1);
    let b = gen_data(8192, 2);
    let c = gen_data(8192, 3);
    let old = [a.as_slice(), b.as_slice(), c.as_slice()].concat();
    let new = [c.as_slice(), a.as_slice(), b.as_slice()].concat();
    roundtrip(&old, &new, BlockCompression::default());
}

#[cfg(feature = "lzma")]
#[test]
fn lzma_blocks_roundtrip() {
    let old = gen_data(32 * 1024, 5);
    let mut new = old.clone();
    for i in (0..new.len()).step_by(777) {
        new[i] ^= 0x5a;
    }
    let patch = roundtrip(&old, &new, BlockCompression::Lzma);
    assert_eq!(&patch[..8], b"BSDIFF4X");
}

#[test]
fn flipped_magic_writes_nothing() {
    let old = b"some old file contents".to_vec();
    let new = b"some new file contents!".to_vec();
    let mut patch = bsdiff::encode(&old, &new, &DiffOptions::default()).unwrap();
    patch[0] ^= 0xFF;

    let mut out = Vec::new();
    let err = bsdiff::decode(&old, &patch, &mut out).unwrap_err();
    assert!(matches!(err, PatchError::InvalidMagic { .. }));
    assert!(err.is_corrupt_input());
    assert!(out.is_empty());
}

#[test]
fn truncated_patch_is_an_error() {
    let old = gen_data(4096, 9);
    let mut new = old.clone();
    new[100] = !new[100];
    let patch = bsdiff::encode(&old, &new, &DiffOptions::default()).unwrap();
    for cut in [0, 8, 31, 33] {
        assert!(bsdiff::decode_to_vec(&old, &patch[..cut]).is_err(), "cut={cut}");
    }
}

#[test]
fn incremental_decoder_reports_progress() {
    let old = gen_data(16 * 1024, 21);
    let mut new = old.clone();
    new[2000..2010].copy_from_slice(b"0123456789");
    new.extend_from_slice(&gen_data(500, 22));
    let patch = bsdiff::encode(&old, &new, &DiffOptions::default()).unwrap();

    let (_, expected) = bsdiff::read_control_block(&patch).unwrap();
    let mut decoder = PatchDecoder::new(&old, &patch).unwrap();
    let mut out = Vec::new();
    let mut seen: Vec<ControlTriple> = Vec::new();
    while let Some(triple) = decoder.step(&mut out).unwrap() {
        seen.push(triple);
        assert_eq!(decoder.bytes_written(), out.len() as u64);
    }
    assert!(decoder.is_finished());
    assert_eq!(decoder.triples_applied(), seen.len() as u64);
    assert!(expected.starts_with(&seen));
    let produced: i64 = seen.iter().map(|t| t.copy_len + t.extra_len).sum();
    assert_eq!(produced, new.len() as i64);
    assert_eq!(out, new);
}

#[test]
fn large_file_roundtrip() {
    let old = gen_data(1024 * 1024, 99);
    let mut new = old.clone();
    for i in (0..new.len()).step_by(32 * 1024) {
        new[i] = new[i].wrapping_add(1);
    }
    let patch = roundtrip(&old, &new, BlockCompression::Zlib { level: 6 });
    assert!(patch.len() < 64 * 1024, "patch={}", patch.len());
}
