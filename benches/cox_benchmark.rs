use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use coop_cox::{
    baseline::integrate_survival,
    likelihood::partial_log_likelihood,
    CoxModel, CrossValidator, SurvivalData,
};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

fn generate_synthetic_data(n_samples: usize, widths: &[usize]) -> SurvivalData {
    let mut rng = StdRng::seed_from_u64(42);

    let blocks: Vec<Array2<f64>> = widths
        .iter()
        .map(|&p| Array2::from_shape_fn((n_samples, p), |_| rng.gen_range(-2.0..2.0)))
        .collect();

    let mut times = Vec::with_capacity(n_samples);
    let mut events = Vec::with_capacity(n_samples);

    for i in 0..n_samples {
        // first feature of each block is predictive
        let linear_pred: f64 = blocks.iter().map(|b| 0.5 * b[[i, 0]]).sum();

        let hazard = 0.1 * linear_pred.exp();
        let time = -rng.r#gen::<f64>().ln() / hazard;
        let censoring_time = rng.gen_range(1.0..8.0);

        if time < censoring_time {
            times.push(time);
            events.push(true);
        } else {
            times.push(censoring_time);
            events.push(false);
        }
    }

    SurvivalData::new(times, events, blocks).unwrap()
}

fn benchmark_likelihood(c: &mut Criterion) {
    let mut group = c.benchmark_group("partial_likelihood");

    for &n_samples in [100, 500, 2000].iter() {
        let data = generate_synthetic_data(n_samples, &[20]);
        let design = data.concatenated();
        let beta = Array1::from_elem(20, 0.05);

        group.bench_with_input(
            BenchmarkId::from_parameter(n_samples),
            &n_samples,
            |b, _| {
                b.iter(|| {
                    partial_log_likelihood(
                        black_box(beta.view()),
                        data.times(),
                        data.events(),
                        design.view(),
                    ).unwrap()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_fitting(c: &mut Criterion) {
    let mut group = c.benchmark_group("fitting");
    group.sample_size(10);

    let single = generate_synthetic_data(100, &[20]);
    group.bench_function("single_block_100x20", |b| {
        b.iter(|| {
            let mut model = CoxModel::new().with_max_iterations(500);
            model.fit(black_box(&single), &mut StdRng::seed_from_u64(1)).unwrap();
        });
    });

    for widths in [vec![20, 20], vec![20, 20, 20]] {
        let data = generate_synthetic_data(100, &widths);
        group.bench_function(format!("cooperative_{}_blocks", widths.len()), |b| {
            b.iter(|| {
                let mut model = CoxModel::cooperative(0.5).with_max_iterations(500);
                model.fit(black_box(&data), &mut StdRng::seed_from_u64(1)).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_survival_integration(c: &mut Criterion) {
    let grid = Array1::from_shape_fn(1000, |k| k as f64 * 0.01);
    let hazard = Array1::from_shape_fn(1000, |k| 0.1 + (k as f64 * 0.05).sin().abs());

    c.bench_function("integrate_survival_1000", |b| {
        b.iter(|| integrate_survival(black_box(grid.view()), black_box(hazard.view())));
    });
}

fn benchmark_cross_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_validation");
    group.sample_size(10);

    let data = generate_synthetic_data(100, &[20, 20]);
    let cv = CrossValidator::new(
        CoxModel::cooperative(0.1).with_max_iterations(200),
        vec![0.1, 0.3, 0.5, 0.7, 0.9],
    );

    group.bench_function("5_folds_5_lambdas", |b| {
        b.iter(|| cv.run(black_box(&data)).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_likelihood,
    benchmark_fitting,
    benchmark_survival_integration,
    benchmark_cross_validation
);
criterion_main!(benches);
