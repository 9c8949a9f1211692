//! Merging partial aggregates and deriving the final report.
//!
//! The merge is commutative and associative: counts add, host sets union.
//! Partial aggregates may therefore arrive in any order and any grouping —
//! a linear fold and a tree reduce produce the same combined aggregate.

use std::collections::{HashMap, HashSet};

use crate::aggregate::{ConnKey, PartialAggregate, ReportQuery};
use crate::report::Report;

/// The pointwise sum of a set of [`PartialAggregate`]s.
///
/// Exists only for the duration of one report computation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CombinedAggregate {
    pub counts: HashMap<ConnKey, u64>,
    pub sources_to_pinned: HashSet<String>,
    pub destinations_from_pinned: HashSet<String>,
    pub lines_scanned: u64,
    pub records_in_window: u64,
    pub lines_discarded: u64,
}

impl CombinedAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one partial aggregate into this one.
    pub fn absorb(&mut self, part: PartialAggregate) {
        for (key, count) in part.counts {
            *self.counts.entry(key).or_insert(0) += count;
        }
        self.sources_to_pinned.extend(part.sources_to_pinned);
        self.destinations_from_pinned
            .extend(part.destinations_from_pinned);
        self.lines_scanned += part.lines_scanned;
        self.records_in_window += part.records_in_window;
        self.lines_discarded += part.lines_discarded;
    }
}

/// Fold any number of partial aggregates into one combined aggregate.
pub fn reduce(parts: impl IntoIterator<Item = PartialAggregate>) -> CombinedAggregate {
    let mut combined = CombinedAggregate::new();
    for part in parts {
        combined.absorb(part);
    }
    combined
}

/// Derive the three report answers from a combined aggregate.
///
/// The top destination is the one with the greatest total across all
/// buckets; ties break to the lexicographically smallest host, never to
/// iteration-order accident. An empty aggregate yields the explicit
/// no-data state.
pub fn derive_report(combined: &CombinedAggregate, query: &ReportQuery) -> Report {
    if combined.counts.is_empty() {
        return Report::NoData {
            window: query.window,
        };
    }

    let mut totals: HashMap<&str, u64> = HashMap::new();
    for (key, count) in &combined.counts {
        *totals.entry(key.destination.as_str()).or_insert(0) += count;
    }

    let mut top: Option<(&str, u64)> = None;
    for (destination, total) in totals {
        top = match top {
            None => Some((destination, total)),
            Some((best, best_total)) => {
                if total > best_total || (total == best_total && destination < best) {
                    Some((destination, total))
                } else {
                    Some((best, best_total))
                }
            }
        };
    }

    let (top_destination, top_count) = top.expect("non-empty counts");

    Report::Data {
        window: query.window,
        top_destination: top_destination.to_string(),
        top_count,
        sources_to_pinned: combined.sources_to_pinned.iter().cloned().collect(),
        destinations_from_pinned: combined.destinations_from_pinned.iter().cloned().collect(),
        pinned_source: query.pinned_source.clone(),
        pinned_destination: query.pinned_destination.clone(),
    }
}
