use criterion::{Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::hint::black_box;

use league_sim::elo::{EloConfig, compute_elo};
use league_sim::evaluation::evaluate_forecast;
use league_sim::forecast::{Forecaster, add_forecast};
use league_sim::network::Network;
use league_sim::schedule;
use league_sim::simulate::simulate_results;
use league_sim::true_rating::{self, TrueRatingConfig};

fn played_network(teams: u32) -> Network {
    let mut rng = StdRng::seed_from_u64(7);
    let mut network = schedule::generate("bench", teams, None, 7, 0).unwrap();
    true_rating::compute(&mut network, "true", &TrueRatingConfig::default(), &mut rng).unwrap();
    let forecaster = Forecaster::logistic("true", vec![0.3, -0.9], 0.005);
    add_forecast(&mut network, "true", &forecaster, &mut rng).unwrap();
    simulate_results(&mut network, "true", None, &mut rng).unwrap();
    network
}

fn bench_schedule_generate(c: &mut Criterion) {
    c.bench_function("schedule_generate_40", |b| {
        b.iter(|| {
            let network = schedule::generate("bench", black_box(40), None, 7, 0).unwrap();
            black_box(network.match_count());
        })
    });
}

fn bench_true_rating(c: &mut Criterion) {
    let base = schedule::generate("bench", 40, None, 7, 0).unwrap();
    let cfg = TrueRatingConfig::default();
    c.bench_function("true_rating_40", |b| {
        b.iter(|| {
            let mut network = base.clone();
            let mut rng = StdRng::seed_from_u64(11);
            true_rating::compute(&mut network, "true", &cfg, &mut rng).unwrap();
            black_box(network.team_count());
        })
    });
}

fn bench_elo(c: &mut Criterion) {
    let base = played_network(40);
    let cfg = EloConfig::default();
    c.bench_function("elo_40", |b| {
        b.iter(|| {
            let mut network = base.clone();
            compute_elo(&mut network, "elo", black_box(&cfg)).unwrap();
            black_box(network.has_rating("elo"));
        })
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let base = played_network(40);
    c.bench_function("evaluate_forecast_40", |b| {
        b.iter(|| {
            let mut network = base.clone();
            let summary = evaluate_forecast(&mut network, "true").unwrap();
            black_box(summary.mean_rps);
        })
    });
}

criterion_group!(
    benches,
    bench_schedule_generate,
    bench_true_rating,
    bench_elo,
    bench_evaluate
);
criterion_main!(benches);
