use astc_lz_rdo::bench::perceptual::*;
use astc_lz_rdo_common::allocate::AlignedF32Buffer;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

#[cfg(all(
    any(target_os = "linux", target_os = "macos"),
    any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")
))]
use pprof::criterion::{Output, PProfProfiler};

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Perceptual Filter");

    for dims in [[256usize, 256, 1], [32, 32, 32]] {
        let len = dims.iter().product::<usize>();
        let mut input = AlignedF32Buffer::new(len).unwrap();
        for (i, value) in input.as_mut_slice().iter_mut().enumerate() {
            *value = ((i * 2654435761) >> 16 & 0xFFFF) as f32;
        }
        let mut output = AlignedF32Buffer::new(len).unwrap();
        let mut workspace = AlignedF32Buffer::new(len).unwrap();

        group.throughput(Throughput::Elements(len as u64));
        let label = format!("{}x{}x{}", dims[0], dims[1], dims[2]);

        group.bench_with_input(BenchmarkId::new("x_axis_lpf", &label), &dims, |b, &dims| {
            b.iter(|| {
                apply_1d_convolution_3d(
                    input.as_slice(),
                    output.as_mut_slice(),
                    dims,
                    &INITIAL_LPF,
                    Axis::X,
                )
            })
        });

        for (name, kernel) in [("separable_lpf", &INITIAL_LPF), ("separable_spread", &SPREAD)] {
            group.bench_with_input(BenchmarkId::new(name, &label), &dims, |b, &dims| {
                b.iter(|| {
                    separable_convolve_3d(
                        input.as_slice(),
                        output.as_mut_slice(),
                        workspace.as_mut_slice(),
                        dims,
                        kernel,
                    )
                })
            });
        }
    }

    group.finish();
}

#[cfg(all(
    any(target_os = "linux", target_os = "macos"),
    any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")
))]
criterion_group! {
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = criterion_benchmark
}

#[cfg(not(all(
    any(target_os = "linux", target_os = "macos"),
    any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")
)))]
criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = criterion_benchmark
}

criterion_main!(benches);
