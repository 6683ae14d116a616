use astc_lz_rdo::{lz_rdo_optimize, lz_rdo_setup, LzRdoSettings};
use astc_lz_rdo_common::reference_codec::{ReferenceCodec, ReferenceEncoder};
use astc_lz_rdo_common::{Image, Swizzle};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

#[cfg(all(
    any(target_os = "linux", target_os = "macos"),
    any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")
))]
use pprof::criterion::{Output, PProfProfiler};

const DIM: u32 = 256;

/// Smooth gradients with a noisy band, so both flat and busy regions are present.
fn synthetic_image() -> Vec<u8> {
    let mut state = 0x2545F491u32;
    let mut data = Vec::with_capacity((DIM * DIM * 4) as usize);
    for y in 0..DIM {
        for x in 0..DIM {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let noise = if (96..160).contains(&y) { (state >> 27) as u8 } else { 0 };
            data.extend_from_slice(&[
                x as u8 ^ noise,
                y as u8,
                ((x + y) / 2) as u8,
                255,
            ]);
        }
    }
    data
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("LZ RDO");
    let data = synthetic_image();
    let image = Image::new(DIM, DIM, 1, &data).unwrap();

    for dim in [4u8, 6, 8] {
        let codec = ReferenceCodec::new(dim, dim);
        let settings = LzRdoSettings::default();
        let config = settings.decode_config();
        let baseline = ReferenceEncoder::new(&codec, config).encode_image(&image, &Swizzle::default());
        let restricted =
            ReferenceEncoder::restricted(&codec, config).encode_image(&image, &Swizzle::default());

        group.throughput(Throughput::Bytes(baseline.len() as u64));

        group.bench_with_input(BenchmarkId::new("setup", dim), &dim, |b, _| {
            b.iter(|| lz_rdo_setup(&codec, &settings, &image).unwrap())
        });

        let weights = lz_rdo_setup(&codec, &settings, &image).unwrap();
        let mut blocks = baseline.clone();
        group.bench_with_input(BenchmarkId::new("optimize", dim), &dim, |b, _| {
            b.iter(|| {
                blocks.copy_from_slice(&baseline);
                lz_rdo_optimize(
                    &codec,
                    &settings,
                    &image,
                    &weights,
                    &mut blocks,
                    Some(&restricted),
                    None,
                )
                .unwrap()
            })
        });
    }

    group.finish();
}

#[cfg(all(
    any(target_os = "linux", target_os = "macos"),
    any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")
))]
criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10).with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = criterion_benchmark
}

#[cfg(not(all(
    any(target_os = "linux", target_os = "macos"),
    any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")
)))]
criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = criterion_benchmark
}

criterion_main!(benches);
