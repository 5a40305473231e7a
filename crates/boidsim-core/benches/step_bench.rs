use boidsim_core::{FlockConfig, Simulation};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::time::Duration;

fn bench_flock_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("flock_step");
    // Allow env overrides so CI and local runs can trade time for stability.
    let samples: usize = std::env::var("BOIDSIM_BENCH_SAMPLES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(30);
    let measure: u64 = std::env::var("BOIDSIM_BENCH_MEASURE_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(5);
    group.sample_size(samples);
    group.measurement_time(Duration::from_secs(measure));

    let steps: usize = std::env::var("BOIDSIM_BENCH_STEPS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(16);
    let boid_counts: Vec<usize> = std::env::var("BOIDSIM_BENCH_BOIDS")
        .ok()
        .map(|s| {
            s.split(',')
                .filter_map(|t| t.trim().parse::<usize>().ok())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| vec![200, 500, 1000]);

    for &num_boids in &boid_counts {
        group.bench_function(format!("steps{steps}_boids{num_boids}"), |b| {
            b.iter_batched(
                || {
                    let config = FlockConfig {
                        num_boids,
                        ..FlockConfig::default()
                    };
                    Simulation::new(0xBEEF, config).expect("simulation")
                },
                |mut sim| {
                    for _ in 0..steps {
                        sim.step();
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_flock_steps);
criterion_main!(benches);
