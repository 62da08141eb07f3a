use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use volsmile::extrapolation::{
    SabrTailExtrapolation, ShiftedLogNormal, ShiftedLogNormalTailFitter, TailFailureMode, TailSide,
};
use volsmile::smile::{SabrHaganVolatilityFunction, SabrParameters};
use volsmile::{OptionType, TailParameters};

fn shifted_lognormal_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("shifted_lognormal");
    let fitter = ShiftedLogNormalTailFitter::default();

    group.bench_function("fit_vol_and_slope", |b| {
        b.iter(|| {
            fitter
                .fit_tail(
                    black_box(100.0),
                    black_box(120.0),
                    black_box(0.2),
                    black_box(-0.002),
                    black_box(1.0),
                    TailFailureMode::Exception,
                )
                .unwrap()
        });
    });

    group.bench_function("fit_quietly_out_of_range_slope", |b| {
        b.iter(|| {
            fitter
                .fit_tail(
                    black_box(100.0),
                    black_box(120.0),
                    black_box(0.2),
                    black_box(0.5),
                    black_box(1.0),
                    TailFailureMode::Quiet,
                )
                .unwrap()
        });
    });

    let tail = ShiftedLogNormal::new(100.0, 1.0, TailParameters::new(0.05, 0.2).unwrap()).unwrap();
    group.bench_function("tail_vol_query", |b| {
        b.iter(|| {
            for k in 120..=200 {
                black_box(tail.vol(black_box(k as f64)).unwrap());
            }
        });
    });

    group.finish();
}

fn sabr_tail_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("sabr_tail");
    let params = SabrParameters::new(0.2, 1.0, -0.3, 0.4).unwrap();

    group.bench_function("right_tail_construction", |b| {
        b.iter(|| {
            SabrTailExtrapolation::new(
                black_box(100.0),
                params,
                black_box(130.0),
                black_box(1.0),
                black_box(2.5),
                TailSide::Right,
                SabrHaganVolatilityFunction,
            )
            .unwrap()
        });
    });

    let tail = SabrTailExtrapolation::new(
        100.0,
        params,
        130.0,
        1.0,
        2.5,
        TailSide::Right,
        SabrHaganVolatilityFunction,
    )
    .unwrap();
    group.bench_function("right_tail_price", |b| {
        b.iter(|| {
            for k in 130..=300 {
                black_box(tail.price(black_box(k as f64), OptionType::Call).unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, shifted_lognormal_benchmarks, sabr_tail_benchmarks);
criterion_main!(benches);
