use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use connwatch::aggregate::{aggregate_partition, PartialAggregate, ReportQuery, Window};
use connwatch::config::{GenerateConfig, ReportConfig};
use connwatch::fake;
use connwatch::partition;
use connwatch::record;
use connwatch::reduce::{derive_report, reduce};
use connwatch::report::{Report, ReportSink};
use connwatch::scheduler::Scheduler;

const WINDOW_START: i64 = 1_000;
const WINDOW_END: i64 = 2_000;
const GRANULARITY: i64 = 150;

/// Deterministic synthetic connection lines: timestamps walk the window and
/// beyond it, hosts cycle through small pools, and every seventh line is
/// malformed.
fn synthetic_lines(seed: i64, count: i64) -> Vec<String> {
    let hosts = ["alfa", "bravo", "charlie", "delta"];
    let servers = ["Quebec", "Romeo", "Sierra", "Tango", "Uniform"];

    (0..count)
        .map(|i| {
            if i % 7 == 3 {
                return format!("corrupted line number {i}");
            }
            // Roughly one in five lands outside the window.
            let ts = WINDOW_START - 100 + (seed * 31 + i * 47) % 1_300;
            let host = hosts[((seed + i) % hosts.len() as i64) as usize];
            let server = servers[((seed * 3 + i * 5) % servers.len() as i64) as usize];
            format!("{ts} {host} {server}")
        })
        .collect()
}

fn write_lines(path: &Path, lines: &[String]) {
    let mut f = std::fs::File::create(path).expect("create log");
    for line in lines {
        writeln!(f, "{line}").expect("write line");
    }
}

fn query() -> ReportQuery {
    ReportQuery {
        window: Window {
            start: WINDOW_START,
            end: WINDOW_END,
        },
        granularity_seconds: GRANULARITY,
        pinned_source: "alfa".to_string(),
        pinned_destination: "Sierra".to_string(),
    }
}

/// Reference answer computed line-by-line, with no partitioning involved.
struct Direct {
    per_destination: HashMap<String, u64>,
    in_window: u64,
    sources_to_pinned: BTreeSet<String>,
    destinations_from_pinned: BTreeSet<String>,
}

fn direct_answer(all_lines: &[String], q: &ReportQuery) -> Direct {
    let mut direct = Direct {
        per_destination: HashMap::new(),
        in_window: 0,
        sources_to_pinned: BTreeSet::new(),
        destinations_from_pinned: BTreeSet::new(),
    };

    for line in all_lines {
        let Ok(rec) = record::parse_line(line) else {
            continue;
        };
        if !q.window.contains(rec.timestamp) {
            continue;
        }
        direct.in_window += 1;
        if rec.destination == q.pinned_destination {
            direct.sources_to_pinned.insert(rec.source.clone());
        }
        if rec.source == q.pinned_source {
            direct.destinations_from_pinned.insert(rec.destination.clone());
        }
        *direct.per_destination.entry(rec.destination).or_insert(0) += 1;
    }

    direct
}

#[test]
fn pipeline_blackbox_correctness_and_invariants() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut all_lines = Vec::new();
    for (i, name) in ["connections.1.log", "connections.2.log", "connections.3.log"]
        .iter()
        .enumerate()
    {
        let lines = synthetic_lines(i as i64 + 1, 400);
        write_lines(&dir.path().join(name), &lines);
        all_lines.extend(lines);
    }

    let q = query();
    let pattern = format!("{}/connections*.log", dir.path().display());

    // Small chunks force many partitions per file, with cuts landing
    // mid-line.
    let partitions = partition::enumerate(&pattern, 512).expect("enumerate");
    assert!(partitions.len() > 10, "expected many partitions");

    let partials: Vec<PartialAggregate> = partitions
        .iter()
        .map(|p| aggregate_partition(p, &q).expect("aggregate"))
        .collect();

    let combined = reduce(partials.clone());
    let direct = direct_answer(&all_lines, &q);

    // Every in-window record is counted exactly once despite partitioning.
    assert_eq!(combined.records_in_window, direct.in_window);
    assert_eq!(combined.lines_scanned as usize, all_lines.len());

    // Bucket sums per destination equal the direct per-destination counts.
    let mut bucketed: HashMap<String, u64> = HashMap::new();
    for (key, count) in &combined.counts {
        *bucketed.entry(key.destination.clone()).or_insert(0) += count;
    }
    assert_eq!(bucketed, direct.per_destination);

    // Merge order and grouping never change the combined aggregate.
    let mut reversed = partials.clone();
    reversed.reverse();
    assert_eq!(reduce(reversed), combined);

    let mut rotated = partials.clone();
    rotated.rotate_left(partials.len() / 2);
    assert_eq!(reduce(rotated), combined);

    let half = partials.len() / 2;
    let mut grouped = reduce(partials[..half].to_vec());
    for part in partials[half..].to_vec() {
        grouped.absorb(part);
    }
    assert_eq!(grouped, combined);

    // The derived report agrees with the direct answer.
    let report = derive_report(&combined, &q);
    let Report::Data {
        top_destination,
        top_count,
        sources_to_pinned,
        destinations_from_pinned,
        ..
    } = report
    else {
        panic!("expected data report");
    };

    let direct_max = direct.per_destination.values().copied().max().expect("data");
    let direct_top = direct
        .per_destination
        .iter()
        .filter(|(_, &count)| count == direct_max)
        .map(|(destination, _)| destination.clone())
        .min()
        .expect("data");

    assert_eq!(top_destination, direct_top);
    assert_eq!(top_count, direct_max);
    assert_eq!(sources_to_pinned, direct.sources_to_pinned);
    assert_eq!(destinations_from_pinned, direct.destinations_from_pinned);
}

#[tokio::test]
async fn pipeline_end_to_end_over_generated_logs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_path = dir.path().join("connections.1.log");

    let generate = GenerateConfig {
        location: log_path.display().to_string(),
        span: Duration::from_secs(600),
        interval: Duration::from_secs(60),
        lines_per_interval: 200,
        ..Default::default()
    };
    let now = 50_000;
    let summary = fake::generate_at(&generate, now).expect("generate");
    assert_eq!(summary.lines_written, 2_000);

    let cfg = ReportConfig {
        location: format!("{}/connections*.log", dir.path().display()),
        pinned_source: generate.hosts[0].clone(),
        pinned_destination: generate.servers[0].clone(),
        window: Duration::from_secs(600),
        granularity: Duration::from_secs(120),
        partition_bytes: 4 * 1024,
        workers: 4,
        ..Default::default()
    };

    let scheduler = Scheduler::new(cfg, ReportSink::Stdout, CancellationToken::new());
    let report = scheduler.run_tick_at(now).await.expect("tick");

    let Report::Data {
        top_count,
        sources_to_pinned,
        destinations_from_pinned,
        ..
    } = report
    else {
        panic!("expected data report");
    };

    // All generated hosts come from the configured pools.
    assert!(top_count > 0);
    for host in &sources_to_pinned {
        assert!(generate.hosts.contains(host));
    }
    for server in &destinations_from_pinned {
        assert!(generate.servers.contains(server));
    }
}
