use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use pe_rs::{
    run_sampler, GaussianLikelihood, Likelihood, NestedSettings, Parameters, Prior, PriorDict,
    RunSettings, SamplerKind,
};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

fn make_data(n: usize) -> Vec<f64> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let normal = Normal::new(3., 4.).unwrap();
    (0..n).map(|_| normal.sample(&mut rng)).collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let params = Parameters::from([("mu", 3.), ("sigma", 4.)]);

    let likelihood = GaussianLikelihood::new(make_data(100));
    c.bench_function("gaussian likelihood 100", |b| {
        b.iter(|| likelihood.log_likelihood(black_box(&params)))
    });

    let likelihood = GaussianLikelihood::new(make_data(10000));
    c.bench_function("gaussian likelihood 10000", |b| {
        b.iter(|| likelihood.log_likelihood(black_box(&params)))
    });

    let likelihood = GaussianLikelihood::new(make_data(100));
    let mut priors = PriorDict::new();
    priors.insert("mu", Prior::uniform(0., 5.).unwrap());
    priors.insert("sigma", Prior::uniform(0., 10.).unwrap());

    let mut group = c.benchmark_group("nested");
    group.sample_size(10);
    group.bench_function("nested gaussian nlive 100", |b| {
        b.iter_batched(
            || {
                RunSettings::new(SamplerKind::Nested(NestedSettings {
                    nlive: 100,
                    walks: 20,
                    ..Default::default()
                }))
                .with_save(false)
            },
            |settings| run_sampler(&likelihood, &priors, settings).unwrap(),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
