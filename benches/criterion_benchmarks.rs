use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use deltapack::bsdiff::{self, DiffOptions, SuffixArray};
use deltapack::compress::BlockCompression;
use deltapack::delta::DeltaManager;
use std::fs;
use std::path::Path;

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed;
    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push((s >> 33) as u8);
    }
    out
}

fn mutate(base: &[u8], stride: usize) -> Vec<u8> {
    let mut out = base.to_vec();
    for i in (0..out.len()).step_by(stride.max(1)) {
        out[i] = out[i].wrapping_add(1);
    }
    out
}

fn encode_patch(old: &[u8], new: &[u8], compression: BlockCompression) -> Vec<u8> {
    bsdiff::encode(old, new, &DiffOptions { compression }).unwrap()
}

fn write_ratio_snapshot() {
    let old = gen_data(512 * 1024, 123);
    let new = mutate(&old, 4096);
    let mut csv = String::from("compression,patch_bytes,new_bytes,ratio\n");
    let mut configs = vec![
        ("zlib-1", BlockCompression::Zlib { level: 1 }),
        ("zlib-6", BlockCompression::Zlib { level: 6 }),
        ("zlib-9", BlockCompression::Zlib { level: 9 }),
    ];
    #[cfg(feature = "lzma")]
    configs.push(("lzma", BlockCompression::Lzma));
    for (name, compression) in configs {
        let patch = encode_patch(&old, &new, compression);
        let ratio = patch.len() as f64 / new.len() as f64;
        csv.push_str(&format!("{name},{},{},{}\n", patch.len(), new.len(), ratio));
    }
    let out_dir = Path::new("target/criterion/custom_reports");
    let _ = fs::create_dir_all(out_dir);
    let _ = fs::write(out_dir.join("ratio_snapshot.csv"), csv);
}

fn bench_suffix_sort(c: &mut Criterion) {
    let mut g = c.benchmark_group("suffix_sort_mb_s");
    for size in [64 * 1024usize, 512 * 1024, 2 * 1024 * 1024] {
        let old = gen_data(size, 1);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(SuffixArray::build(black_box(&old))));
        });
    }
    g.finish();
}

fn bench_encoding_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("encoding_speed_mb_s");
    g.sample_size(10);
    for size in [64 * 1024usize, 512 * 1024, 2 * 1024 * 1024] {
        let old = gen_data(size, 1);
        let new = mutate(&old, 1024);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let patch = encode_patch(black_box(&old), black_box(&new), BlockCompression::default());
                black_box(patch);
            });
        });
    }
    g.finish();
}

fn bench_decoding_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("decoding_speed_vs_patch");
    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let old = gen_data(size, 2);
        let new = mutate(&old, 2048);
        let patch = encode_patch(&old, &new, BlockCompression::default());
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let out = bsdiff::decode_to_vec(black_box(&old), black_box(&patch)).unwrap();
                black_box(out);
            });
        });
    }
    g.finish();
}

fn bench_ratio_vs_compression(c: &mut Criterion) {
    write_ratio_snapshot();
    let mut g = c.benchmark_group("patch_size_vs_compression");
    g.sample_size(10);
    let old = gen_data(256 * 1024, 3);
    let new = mutate(&old, 4096);
    for level in [1u32, 6, 9] {
        g.bench_with_input(BenchmarkId::new("zlib", level), &level, |b, level| {
            b.iter(|| {
                let patch = encode_patch(&old, &new, BlockCompression::Zlib { level: *level });
                black_box(patch.len() as f64 / new.len() as f64);
            });
        });
    }
    g.finish();
}

fn bench_delta_race(c: &mut Criterion) {
    let mut g = c.benchmark_group("delta_race");
    g.sample_size(10);
    let manager = DeltaManager::default();
    for size in [256 * 1024usize, 1024 * 1024] {
        let old = gen_data(size, 4);
        let new = mutate(&old, 1024);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(manager.create_delta_from_slices(&old, &new)));
        });
    }
    g.finish();
}

fn bench_real_world_scenarios(c: &mut Criterion) {
    let mut g = c.benchmark_group("real_world_scenarios");
    g.sample_size(10);
    let scenarios = [
        ("software_update", 2 * 1024 * 1024usize, 1024usize),
        ("document_versioning", 512 * 1024usize, 256usize),
        ("compressed_payload", 1024 * 1024usize, 16384usize),
    ];

    for (name, size, stride) in scenarios {
        let old = gen_data(size, size as u64);
        let new = mutate(&old, stride);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_function(name, |b| {
            b.iter(|| {
                let patch = encode_patch(&old, &new, BlockCompression::default());
                let out = bsdiff::decode_to_vec(&old, &patch).unwrap();
                black_box(out);
            });
        });
    }
    g.finish();
}

criterion_group!(
    benches,
    bench_suffix_sort,
    bench_encoding_speed,
    bench_decoding_speed,
    bench_ratio_vs_compression,
    bench_delta_race,
    bench_real_world_scenarios
);
criterion_main!(benches);
