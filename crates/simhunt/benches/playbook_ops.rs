//! Playbook Operations Benchmarks
//!
//! Benchmarks for the hot paths of a run: seeded choice, crash pattern
//! matching, launch statistics, regression detection, and result formatting.
//!
//! Run with: `cargo bench --bench playbook_ops`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use simhunt::crash::CrashPatternMatcher;
use simhunt::performance::{detect_regressions, MetricStats, MetricSummary};
use simhunt::playbook::TerminationReason;
use simhunt::{
    format_crash_hunt_result, format_crash_hunt_result_compact, CrashHuntResult, MockSimulator,
    SeededRng,
};

fn generate_log_lines(count: usize, crash_at: Option<usize>) -> Vec<String> {
    (0..count)
        .map(|i| {
            if Some(i) == crash_at {
                "Terminating app due to uncaught exception 'NSRangeException'".to_string()
            } else {
                format!("MockApp[4242:{i}] [UIKit] layout pass {i} finished")
            }
        })
        .collect()
}

fn sample_result(actions: u32) -> CrashHuntResult {
    CrashHuntResult {
        completed: true,
        termination_reason: TerminationReason::DurationElapsed,
        simulator: Some("iPhone 15".to_string()),
        bundle_id: Some("com.example.app".to_string()),
        seed: 42,
        duration_secs: 300,
        elapsed_ms: 300_120,
        actions_performed: actions,
        actions: Vec::new(),
        crashes_found: 0,
        crashes: Vec::new(),
        max_depth_reached: 7,
        depth_resets: 3,
        artifacts_dir: None,
        error: None,
    }
}

fn bench_weighted_choice(c: &mut Criterion) {
    let mut group = c.benchmark_group("weighted_choice");
    let kinds = ["tap", "scroll", "swipe", "back"];
    let weights = [60.0, 20.0, 15.0, 5.0];

    for draws in [100_usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(draws), &draws, |bench, &draws| {
            bench.iter(|| {
                let mut rng = SeededRng::new(Some(42));
                for _ in 0..draws {
                    black_box(rng.weighted_choice(black_box(&kinds), black_box(&weights)));
                }
            });
        });
    }

    group.finish();
}

fn bench_crash_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("crash_matching");

    let streams = vec![
        ("clean_1k", generate_log_lines(1_000, None)),
        ("crash_at_end_1k", generate_log_lines(1_000, Some(999))),
        ("clean_10k", generate_log_lines(10_000, None)),
    ];

    for (name, lines) in streams {
        group.bench_with_input(BenchmarkId::from_parameter(name), &lines, |bench, lines| {
            bench.iter(|| {
                let mut matcher = CrashPatternMatcher::new();
                for line in lines {
                    black_box(matcher.observe(black_box(line)));
                }
                black_box(matcher.is_detected());
            });
        });
    }

    group.finish();
}

fn bench_metric_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("metric_stats");

    for size in [5_usize, 100, 10_000] {
        let values: Vec<f64> = (0..size).map(|i| 100.0 + (i % 37) as f64 * 1.5).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &values, |bench, values| {
            bench.iter(|| black_box(MetricStats::from_values(black_box(values))));
        });
    }

    group.finish();
}

fn bench_regression_detection(c: &mut Criterion) {
    let baseline = MetricSummary {
        cold_launch_avg_ms: Some(100.0),
        warm_launch_avg_ms: Some(40.0),
        memory_peak_mb: Some(120.0),
        fps_avg: Some(59.0),
        fps_min: Some(55.0),
        ..MetricSummary::default()
    };
    let current = MetricSummary {
        cold_launch_avg_ms: Some(150.0),
        warm_launch_avg_ms: Some(41.0),
        memory_peak_mb: Some(160.0),
        fps_avg: Some(58.0),
        fps_min: Some(30.0),
        ..MetricSummary::default()
    };

    c.bench_function("detect_regressions", |bench| {
        bench.iter(|| {
            black_box(detect_regressions(
                black_box(&current),
                black_box(&baseline),
                10.0,
            ))
        });
    });
}

fn bench_formatting(c: &mut Criterion) {
    let mut group = c.benchmark_group("crash_hunt_formatting");
    let result = sample_result(500);

    group.bench_function("markdown", |bench| {
        bench.iter(|| black_box(format_crash_hunt_result(black_box(&result))));
    });
    group.bench_function("compact", |bench| {
        bench.iter(|| black_box(format_crash_hunt_result_compact(black_box(&result))));
    });

    group.finish();
}

fn bench_ui_tree_search(c: &mut Criterion) {
    let tree = MockSimulator::sample_ui_tree();
    c.bench_function("ui_tree_find", |bench| {
        bench.iter(|| black_box(tree.find(black_box("login"))));
    });
}

criterion_group!(
    benches,
    bench_weighted_choice,
    bench_crash_matching,
    bench_metric_stats,
    bench_regression_detection,
    bench_formatting,
    bench_ui_tree_search
);
criterion_main!(benches);
