//! Synthetic connection-log generation.
//!
//! Writes test input in the exact format the pipeline consumes: the trailing
//! `span` is cut into fixed `interval`s and each interval appends a burst of
//! lines whose timestamps are drawn uniformly from it, so files come out
//! roughly time-ordered overall but unordered within a burst.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rand::Rng;
use tracing::info;

use crate::config::GenerateConfig;

/// What one generator run produced.
#[derive(Debug, Clone, Copy)]
pub struct GenerateSummary {
    pub lines_written: u64,
    /// First second timestamps were drawn from.
    pub from: i64,
    /// End of the drawn range (exclusive).
    pub to: i64,
}

/// Append a synthetic log reaching back `span` from the current wall clock.
pub fn generate(cfg: &GenerateConfig) -> Result<GenerateSummary> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    generate_at(cfg, now)
}

/// Append a synthetic log for the `span` ending at `now`.
pub fn generate_at(cfg: &GenerateConfig, now: i64) -> Result<GenerateSummary> {
    let span = cfg.span.as_secs() as i64;
    let interval = cfg.interval.as_secs() as i64;
    let from = now - span;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cfg.location)
        .with_context(|| format!("opening output file {:?}", cfg.location))?;
    let mut out = BufWriter::new(file);
    let mut rng = rand::rng();

    let mut lines_written = 0u64;
    let mut start = from;

    while start < now {
        let end = (start + interval).min(now);

        for _ in 0..cfg.lines_per_interval {
            let ts = rng.random_range(start..end);
            let host = &cfg.hosts[rng.random_range(0..cfg.hosts.len())];
            let server = &cfg.servers[rng.random_range(0..cfg.servers.len())];
            writeln!(out, "{ts} {host} {server}").context("writing log line")?;
            lines_written += 1;
        }

        start = end;
    }

    out.flush().context("flushing output file")?;

    info!(
        location = %cfg.location,
        lines = lines_written,
        from,
        to = now,
        "synthetic log written",
    );

    Ok(GenerateSummary {
        lines_written,
        from,
        to: now,
    })
}
