use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use windelta::{DeltaConfig, decode, encode_with_config};

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

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for size in [64 * 1024, 1024 * 1024] {
        let source = gen_data(size, 42);
        let target = mutate(&source, 4096);
        group.throughput(Throughput::Bytes(size as u64));
        for level in [1u32, 6, 9] {
            let config = DeltaConfig {
                level,
                ..Default::default()
            };
            group.bench_with_input(
                BenchmarkId::new(format!("level{level}"), size),
                &size,
                |b, _| {
                    b.iter(|| {
                        encode_with_config(black_box(&source), black_box(&target), &config)
                            .unwrap()
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for size in [64 * 1024, 1024 * 1024] {
        let source = gen_data(size, 7);
        let target = mutate(&source, 2048);
        let delta = encode_with_config(&source, &target, &DeltaConfig::default()).unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("default", size), &size, |b, _| {
            b.iter(|| decode(black_box(&source), black_box(&delta)).unwrap())
        });
    }
    group.finish();
}

fn bench_literal_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_no_source");
    let target = gen_data(1024 * 1024, 99);
    group.throughput(Throughput::Bytes(target.len() as u64));
    group.bench_function("1MiB", |b| {
        b.iter(|| {
            encode_with_config(black_box(&[]), black_box(&target), &DeltaConfig::default())
                .unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_literal_only);
criterion_main!(benches);
