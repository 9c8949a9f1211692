//! Per-partition filtering and local aggregation.
//!
//! One [`aggregate_partition`] invocation streams a partition's lines through
//! the record parser, drops malformed and out-of-window records, and folds
//! the rest into a [`PartialAggregate`]: per-(bucket, source, destination)
//! connection counts plus set-membership evidence for the two pinned-host
//! queries. Memory is bounded by the number of distinct triples observed,
//! never by raw line count. Each invocation owns its aggregate exclusively
//! until it is handed to the reducer — no locks in the hot path.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};

use anyhow::{Context, Result};

use crate::partition::Partition;
use crate::record;

/// Closed-inclusive trailing time window, in seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    /// The window covering the `seconds` up to and including `end`.
    pub fn trailing(end: i64, seconds: i64) -> Self {
        Self {
            start: end - seconds,
            end,
        }
    }

    /// Whether `timestamp` falls inside the window. Both ends are inclusive.
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    /// Window length in seconds.
    pub fn seconds(&self) -> i64 {
        self.end - self.start
    }

    /// Fixed-width trailing bucket for an in-window timestamp: bucket 0 is
    /// the newest `granularity_seconds` before the window end.
    pub fn bucket(&self, timestamp: i64, granularity_seconds: i64) -> u64 {
        ((self.end - timestamp) / granularity_seconds) as u64
    }
}

/// The run parameters shared by every aggregator invocation of one tick.
#[derive(Debug, Clone)]
pub struct ReportQuery {
    pub window: Window,
    pub granularity_seconds: i64,
    pub pinned_source: String,
    pub pinned_destination: String,
}

/// Grouping key for intermediate connection counts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnKey {
    pub bucket: u64,
    pub source: String,
    pub destination: String,
}

/// The local aggregation result of one partition.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PartialAggregate {
    /// Connection counts per (bucket, source, destination).
    pub counts: HashMap<ConnKey, u64>,
    /// Sources observed connecting to the pinned destination.
    pub sources_to_pinned: HashSet<String>,
    /// Destinations observed reached from the pinned source.
    pub destinations_from_pinned: HashSet<String>,
    /// Lines read from the partition.
    pub lines_scanned: u64,
    /// Lines that parsed and fell inside the window.
    pub records_in_window: u64,
    /// Lines discarded as malformed.
    pub lines_discarded: u64,
}

impl PartialAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one parsed record into the aggregate.
    pub fn observe(&mut self, rec: record::Record, query: &ReportQuery) {
        if !query.window.contains(rec.timestamp) {
            return;
        }

        self.records_in_window += 1;

        if rec.destination == query.pinned_destination {
            self.sources_to_pinned.insert(rec.source.clone());
        }
        if rec.source == query.pinned_source {
            self.destinations_from_pinned.insert(rec.destination.clone());
        }

        let bucket = query.window.bucket(rec.timestamp, query.granularity_seconds);
        *self
            .counts
            .entry(ConnKey {
                bucket,
                source: rec.source,
                destination: rec.destination,
            })
            .or_insert(0) += 1;
    }
}

/// Stream one partition into a [`PartialAggregate`].
///
/// Ownership rule: the partition processes exactly the lines whose first
/// byte lies in `[start, end)`. A reader starting mid-file rewinds one byte
/// and discards up to the first newline, so a line beginning exactly at
/// `start` is kept; the last owned line is read to completion even when it
/// crosses `end`.
pub fn aggregate_partition(partition: &Partition, query: &ReportQuery) -> Result<PartialAggregate> {
    let file = File::open(&partition.path)
        .with_context(|| format!("opening partition {partition}"))?;
    let mut reader = BufReader::new(file);

    let mut pos = partition.start;
    if partition.start > 0 {
        reader
            .seek(SeekFrom::Start(partition.start - 1))
            .with_context(|| format!("seeking partition {partition}"))?;

        let mut skipped = Vec::new();
        let n = reader
            .read_until(b'\n', &mut skipped)
            .with_context(|| format!("aligning partition {partition}"))?;
        pos = partition.start - 1 + n as u64;
    }

    let mut agg = PartialAggregate::new();
    let mut line = Vec::with_capacity(64);

    while pos < partition.end {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("reading partition {partition}"))?;
        if n == 0 {
            break;
        }
        pos += n as u64;

        agg.lines_scanned += 1;
        match record::parse_bytes(&line) {
            Ok(rec) => agg.observe(rec, query),
            Err(_) => agg.lines_discarded += 1,
        }
    }

    Ok(agg)
}
