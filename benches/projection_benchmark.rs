use criterion::{criterion_group, criterion_main, Criterion};
use srg_backend::models::ActivityRecord;
use srg_backend::services::activity::sort_by_pace;
use srg_backend::services::strava::StravaActivity;
use std::hint::black_box;

/// A year of daily activities with varied distances and durations.
fn fixture() -> Vec<StravaActivity> {
    (0..365u64)
        .map(|i| {
            serde_json::from_value(serde_json::json!({
                "id": 10_000_000_000u64 + i,
                "name": format!("Activity {i}"),
                "sport_type": if i % 3 == 0 { "Ride" } else { "Run" },
                "distance": 1000.0 + (i * 137 % 20_000) as f64 + 0.3,
                "moving_time": if i % 50 == 0 { 0 } else { 600 + i * 17 % 5400 },
                "elapsed_time": 7200,
                "total_elevation_gain": (i % 400) as f64 * 1.1,
                "start_date": "2025-01-01T07:00:00Z",
                "start_date_local": "2025-01-01T00:00:00Z",
                "average_speed": 3.217,
                "max_speed": 6.4,
                "average_heartrate": 148.6,
                "map": { "summary_polyline": "u{~vFvyys@fS]" }
            }))
            .expect("valid fixture")
        })
        .collect()
}

fn benchmark_projection(c: &mut Criterion) {
    let activities = fixture();

    let mut group = c.benchmark_group("activity_projection");

    group.bench_function("normalize_year", |b| {
        b.iter(|| {
            black_box(&activities)
                .iter()
                .map(|a| ActivityRecord::from_upstream("123456789", a))
                .collect::<Vec<_>>()
        })
    });

    group.bench_function("sort_by_pace_year", |b| {
        b.iter_batched(
            || activities.clone(),
            |mut batch| sort_by_pace(black_box(&mut batch)),
            criterion::BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, benchmark_projection);
criterion_main!(benches);
