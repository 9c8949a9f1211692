//! Pipeline scheduling.
//!
//! One tick is a full fan-out/fan-in pass: enumerate partitions, dispatch
//! one aggregator invocation per partition onto a bounded worker pool, join
//! them all, reduce, emit the report. Folder mode runs one tick; tail mode
//! repeats forever, recomputing the window from wall-clock time at every
//! tick start so drift never accumulates. Cancellation is checked between
//! ticks only — an in-flight tick always finishes and emits its report.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::{self, PartialAggregate, ReportQuery, Window};
use crate::config::ReportConfig;
use crate::partition;
use crate::reduce;
use crate::report::{Report, ReportSink};

/// Drives the partition → aggregate → reduce → report pipeline.
pub struct Scheduler {
    cfg: ReportConfig,
    sink: ReportSink,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(cfg: ReportConfig, sink: ReportSink, cancel: CancellationToken) -> Self {
        Self { cfg, sink, cancel }
    }

    /// Run to completion: a single tick in folder mode, an unbounded loop in
    /// tail mode.
    pub async fn run(&self) -> Result<()> {
        if self.cfg.tail {
            self.run_tail().await
        } else {
            let report = self.run_tick().await?;
            self.sink.emit(&report);
            Ok(())
        }
    }

    /// Tail mode: tick, report, sleep, repeat. A recoverable tick failure is
    /// logged and the loop continues; only cancellation ends it.
    async fn run_tail(&self) -> Result<()> {
        info!(interval = ?self.cfg.interval, "tail mode started");

        loop {
            match self.run_tick().await {
                Ok(report) => self.sink.emit(&report),
                Err(e) => warn!(error = %e, "tick failed, will retry next interval"),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("tail mode stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.cfg.interval) => {}
            }
        }
    }

    /// Run one tick against the current wall clock.
    pub async fn run_tick(&self) -> Result<Report> {
        self.run_tick_at(unix_now()).await
    }

    /// Run one tick with the window anchored at `now`.
    pub async fn run_tick_at(&self, now: i64) -> Result<Report> {
        let window = Window::trailing(now, self.cfg.window_seconds());
        let query = Arc::new(ReportQuery {
            window,
            granularity_seconds: self.cfg.granularity_seconds(),
            pinned_source: self.cfg.pinned_source.clone(),
            pinned_destination: self.cfg.pinned_destination.clone(),
        });

        let location = self.cfg.expanded_location(Local::now());
        let partitions = partition::enumerate(&location, self.cfg.partition_bytes)
            .context("enumerating partitions")?;

        if partitions.is_empty() {
            warn!(location = %location, "no input matched the location pattern");
            return Ok(Report::NoData { window });
        }

        info!(
            partitions = partitions.len(),
            window_start = window.start,
            window_end = window.end,
            "tick started",
        );

        let semaphore = Arc::new(Semaphore::new(self.cfg.workers));
        let timeout = self.cfg.partition_timeout;
        let mut tasks: JoinSet<PartialAggregate> = JoinSet::new();

        for part in partitions {
            let semaphore = Arc::clone(&semaphore);
            let query = Arc::clone(&query);

            tasks.spawn(async move {
                // The pool only closes on runtime teardown, after all ticks.
                let _permit = semaphore.acquire_owned().await.expect("worker pool open");

                let label = part.to_string();
                let work =
                    tokio::task::spawn_blocking(move || aggregate::aggregate_partition(&part, &query));

                let joined = match timeout {
                    Some(deadline) => match tokio::time::timeout(deadline, work).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            // The blocked read cannot be interrupted; its
                            // result is discarded when it eventually lands.
                            warn!(
                                partition = %label,
                                deadline = ?deadline,
                                "partition read exceeded deadline, degrading to empty",
                            );
                            return PartialAggregate::new();
                        }
                    },
                    None => work.await,
                };

                match joined {
                    Ok(Ok(agg)) => agg,
                    Ok(Err(e)) => {
                        warn!(partition = %label, error = %e, "partition read failed, degrading to empty");
                        PartialAggregate::new()
                    }
                    Err(e) => {
                        warn!(partition = %label, error = %e, "partition worker panicked, degrading to empty");
                        PartialAggregate::new()
                    }
                }
            });
        }

        // Fan-in barrier: the reduce step starts only after every partition
        // of this tick has returned.
        let mut partials = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(agg) => partials.push(agg),
                Err(e) => warn!(error = %e, "aggregation task lost, degrading to empty"),
            }
        }

        let combined = reduce::reduce(partials);

        if combined.lines_discarded > 0 {
            debug!(
                discarded = combined.lines_discarded,
                "malformed lines discarded",
            );
        }

        info!(
            lines = combined.lines_scanned,
            in_window = combined.records_in_window,
            "tick aggregated",
        );

        Ok(reduce::derive_report(&combined, &query))
    }
}

/// Current wall-clock time in seconds since the Unix epoch.
fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
