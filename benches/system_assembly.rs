use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kexpfam::basis::BasisSet;
use kexpfam::full::FullSystemBuilder;
use kexpfam::kernel::GaussianKernel;
use kexpfam::nystrom::NystromSystemBuilder;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

const DIMENSION: usize = 2;
const LAMBDA: f64 = 0.1;

fn random_samples(num_samples: usize) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(0x5EED_F64 + num_samples as u64);
    Array2::from_shape_fn((DIMENSION, num_samples), |_| rng.sample(StandardNormal))
}

fn benchmark_system_assembly(c: &mut Criterion) {
    let sizes = [20_usize, 40, 80];
    let datasets: Vec<_> = sizes
        .iter()
        .map(|&size| (size, random_samples(size)))
        .collect();

    let mut group = c.benchmark_group("system_assembly");
    group.sample_size(10);
    for (size, data) in datasets.iter() {
        let num_params = size * DIMENSION;
        group.throughput(Throughput::Elements(num_params as u64));
        let kernel = GaussianKernel::new(data.view(), 1.0);

        group.bench_with_input(BenchmarkId::new("full", size), &kernel, |b, kernel| {
            b.iter(|| {
                let system = FullSystemBuilder::new(*black_box(kernel), LAMBDA).build();
                black_box(system);
            });
        });

        let basis = BasisSet::random_seeded(num_params / 10, num_params, 7)
            .expect("basis fits the parameter space");
        group.bench_with_input(BenchmarkId::new("nystrom", size), &kernel, |b, kernel| {
            b.iter(|| {
                let system = NystromSystemBuilder::new(*black_box(kernel), LAMBDA, &basis).build();
                black_box(system);
            });
        });
    }
    group.finish();
}

criterion_group!(system_assembly, benchmark_system_assembly);
criterion_main!(system_assembly);
