use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use connwatch::aggregate::{PartialAggregate, ReportQuery, Window};
use connwatch::record::parse_line;
use connwatch::reduce::reduce;

fn query() -> ReportQuery {
    ReportQuery {
        window: Window {
            start: 1_000,
            end: 2_000,
        },
        granularity_seconds: 100,
        pinned_source: "alfa".to_string(),
        pinned_destination: "Sierra".to_string(),
    }
}

fn sample_lines() -> Vec<String> {
    let hosts = ["alfa", "bravo", "charlie", "delta"];
    let servers = ["Quebec", "Romeo", "Sierra", "Tango"];
    (0..1_000)
        .map(|i: i64| {
            let ts = 1_000 + (i * 37) % 1_000;
            let host = hosts[(i % 4) as usize];
            let server = servers[((i * 3) % 4) as usize];
            format!("{ts} {host} {server}")
        })
        .collect()
}

fn bench_parse_line(c: &mut Criterion) {
    c.bench_function("parse_line", |b| {
        b.iter(|| parse_line(black_box("1586961236 quebec Tango")));
    });
}

fn bench_aggregate_observe(c: &mut Criterion) {
    let q = query();
    let lines = sample_lines();

    c.bench_function("aggregate_1k_lines", |b| {
        b.iter_batched(
            PartialAggregate::new,
            |mut agg| {
                for line in &lines {
                    if let Ok(rec) = parse_line(line) {
                        agg.observe(rec, &q);
                    }
                }
                agg
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_reduce_partials(c: &mut Criterion) {
    let q = query();
    let lines = sample_lines();

    let mut partials = Vec::new();
    for chunk in lines.chunks(100) {
        let mut agg = PartialAggregate::new();
        for line in chunk {
            if let Ok(rec) = parse_line(line) {
                agg.observe(rec, &q);
            }
        }
        partials.push(agg);
    }

    c.bench_function("reduce_10_partials", |b| {
        b.iter_batched(
            || partials.clone(),
            |parts| reduce(parts),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_parse_line,
    bench_aggregate_observe,
    bench_reduce_partials
);
criterion_main!(benches);
