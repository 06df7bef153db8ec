use criterion::*;
use dm_calibration::{AcquisitionBasis, Builder, Converter, FromBuilder, InfluenceFunctions, MaskedImage};
use nalgebra::DMatrix;

fn gaussians(n_side: usize, n_px: usize) -> InfluenceFunctions {
    let pitch = n_px as f64 / n_side as f64;
    let layers = (0..n_side * n_side)
        .map(|k| {
            let (yc, xc) = (
                pitch * ((k / n_side) as f64 + 0.5),
                pitch * ((k % n_side) as f64 + 0.5),
            );
            MaskedImage::unmasked(DMatrix::<f64>::from_fn(n_px, n_px, |i, j| {
                let r2 = (i as f64 - yc).powi(2) + (j as f64 - xc).powi(2);
                (-r2 / pitch.powi(2)).exp()
            }))
        })
        .collect();
    InfluenceFunctions::new("bench", layers, AcquisitionBasis::Zonal).unwrap()
}

pub fn reconstructor_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconstructor");
    group.sample_size(10);
    for n_side in [4, 8, 12] {
        let ifs = gaussians(n_side, 64);
        group.bench_with_input(BenchmarkId::new("pseudo-inverse", n_side * n_side), &ifs, |b, ifs| {
            b.iter_batched(
                || Converter::builder().influence_functions(ifs.clone()).build().unwrap(),
                |mut converter| {
                    converter.reconstructor().unwrap();
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

pub fn convert_benchmark(c: &mut Criterion) {
    let ifs = gaussians(12, 64);
    let wavefront = ifs.synthesize(&vec![0.1; ifs.n_actuator()]).unwrap();
    let mut converter = Converter::builder().influence_functions(ifs).build().unwrap();
    converter.convert(&wavefront).unwrap();
    c.bench_function("convert", |b| b.iter(|| converter.convert(black_box(&wavefront)).unwrap()));
}

criterion_group!(benches, reconstructor_benchmark, convert_benchmark);
criterion_main!(benches);
