//! Input partition discovery.
//!
//! Expands a filesystem glob pattern into an ordered sequence of
//! [`Partition`]s: contiguous byte ranges of the matched files, each at most
//! `max_chunk_bytes` long. Files far larger than memory are split so that
//! every slice can be aggregated by exactly one worker. Zero matches is an
//! empty sequence, not an error; the caller decides whether that is a
//! "no data" outcome.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

/// One independently readable slice of the input logs.
///
/// Covers the byte range `[start, end)` of `path`. A partition owns exactly
/// the lines whose first byte lies inside its range; the aggregator skips a
/// partial leading line (owned by the previous partition) and reads past
/// `end` to finish the last line it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub path: PathBuf,
    pub start: u64,
    pub end: u64,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}..{})",
            self.path.display(),
            self.start,
            self.end
        )
    }
}

/// Expand `pattern` into partitions of at most `max_chunk_bytes` each.
///
/// Matched entries that cannot be inspected are skipped with a warning; the
/// tick degrades rather than aborts. The returned sequence is ordered by
/// path, then by byte offset, and its ranges are pairwise disjoint.
pub fn enumerate(pattern: &str, max_chunk_bytes: u64) -> Result<Vec<Partition>> {
    let entries = glob::glob(pattern)
        .with_context(|| format!("invalid location pattern {pattern:?}"))?;

    let mut partitions = Vec::new();

    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "skipping unreadable glob entry");
                continue;
            }
        };

        let len = match std::fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable input");
                continue;
            }
        };

        let mut start = 0u64;
        while start < len {
            let end = (start + max_chunk_bytes).min(len);
            partitions.push(Partition {
                path: path.clone(),
                start,
                end,
            });
            start = end;
        }
    }

    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_enumerate_no_matches_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pattern = format!("{}/*.log", dir.path().display());

        let parts = enumerate(&pattern, 1024).expect("enumerate");
        assert!(parts.is_empty());
    }

    #[test]
    fn test_enumerate_rejects_invalid_pattern() {
        assert!(enumerate("logs/[", 1024).is_err());
    }

    #[test]
    fn test_enumerate_one_partition_per_small_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["connections.1.log", "connections.2.log"] {
            let mut f = std::fs::File::create(dir.path().join(name)).expect("create");
            f.write_all(b"100 alfa bravo\n").expect("write");
        }
        let pattern = format!("{}/connections*.log", dir.path().display());

        let parts = enumerate(&pattern, 1024).expect("enumerate");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].start, 0);
        assert_eq!(parts[0].end, 15);
        // glob returns paths in sorted order.
        assert!(parts[0].path < parts[1].path);
    }

    #[test]
    fn test_enumerate_splits_large_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("big.log");
        std::fs::write(&path, vec![b'x'; 100]).expect("write");
        let pattern = format!("{}/big.log", dir.path().display());

        let parts = enumerate(&pattern, 32).expect("enumerate");
        assert_eq!(parts.len(), 4);
        assert_eq!((parts[0].start, parts[0].end), (0, 32));
        assert_eq!((parts[1].start, parts[1].end), (32, 64));
        assert_eq!((parts[2].start, parts[2].end), (64, 96));
        assert_eq!((parts[3].start, parts[3].end), (96, 100));

        // Ranges tile the file exactly.
        let covered: u64 = parts.iter().map(|p| p.end - p.start).sum();
        assert_eq!(covered, 100);
    }

    #[test]
    fn test_enumerate_skips_empty_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::File::create(dir.path().join("empty.log")).expect("create");
        let pattern = format!("{}/empty.log", dir.path().display());

        let parts = enumerate(&pattern, 1024).expect("enumerate");
        assert!(parts.is_empty());
    }
}
