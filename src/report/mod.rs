//! Report values and emission.

use std::collections::BTreeSet;
use std::fmt;

use tokio::sync::mpsc;
use tracing::warn;

use crate::aggregate::Window;

/// The outcome of one pipeline run.
///
/// `NoData` is an explicit state: it means no record fell inside the window,
/// and is never conflated with a report naming some arbitrary host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    NoData {
        window: Window,
    },
    Data {
        window: Window,
        /// Destination host with the most connections in the window.
        top_destination: String,
        top_count: u64,
        /// Sources ever seen connecting to the pinned destination.
        sources_to_pinned: BTreeSet<String>,
        /// Destinations ever reached from the pinned source.
        destinations_from_pinned: BTreeSet<String>,
        pinned_source: String,
        pinned_destination: String,
    },
}

fn join_hosts(hosts: &BTreeSet<String>) -> String {
    hosts.iter().cloned().collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData { window } => {
                write!(f, "No data in last {} seconds", window.seconds())
            }
            Self::Data {
                top_destination,
                top_count,
                sources_to_pinned,
                destinations_from_pinned,
                pinned_source,
                pinned_destination,
                ..
            } => {
                writeln!(f, "Report results")?;
                writeln!(f, "--------------")?;
                writeln!(f)?;
                writeln!(f, "* Server that received more connections:")?;
                writeln!(f, "  {top_destination} ({top_count} connections)")?;
                writeln!(f)?;
                writeln!(f, "* List of connected hosts to {pinned_destination}:")?;
                writeln!(f, "  {}", join_hosts(sources_to_pinned))?;
                writeln!(f)?;
                writeln!(f, "* List of connections from {pinned_source}:")?;
                write!(f, "  {}", join_hosts(destinations_from_pinned))
            }
        }
    }
}

/// Where finished reports go.
///
/// Enum dispatch rather than a trait object: there are exactly two consumers,
/// the operator's terminal and embedding code (tests, tail supervisors) that
/// wants the typed value.
pub enum ReportSink {
    Stdout,
    Channel(mpsc::UnboundedSender<Report>),
}

impl ReportSink {
    /// Deliver one report.
    pub fn emit(&self, report: &Report) {
        match self {
            Self::Stdout => println!("{report}"),
            Self::Channel(tx) => {
                if tx.send(report.clone()).is_err() {
                    warn!("report receiver dropped, discarding report");
                }
            }
        }
    }
}
