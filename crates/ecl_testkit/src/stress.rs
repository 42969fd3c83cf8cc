//! Concurrent writers for persistent search tests.
//!
//! These helpers store changes from several threads while searches run.

use crate::fixtures::TestChangelog;
use ecl_protocol::Csn;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a concurrent write run.
#[derive(Debug, Clone)]
pub struct WriteRunResult {
    /// `(CSN, change number)` of every stored change, in completion order.
    pub changes: Vec<(Csn, u64)>,
    /// Total duration.
    pub duration: Duration,
}

impl WriteRunResult {
    /// Number of stored changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if nothing was stored.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// The highest change number assigned.
    pub fn last_change_number(&self) -> u64 {
        self.changes.iter().map(|(_, n)| *n).max().unwrap_or(0)
    }
}

/// Configuration for concurrent writers.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Number of writer threads.
    pub threads: usize,
    /// Changes stored by each thread.
    pub changes_per_thread: usize,
    /// Pause between two changes of one thread.
    pub pause: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            changes_per_thread: 25,
            pause: Duration::from_micros(200),
        }
    }
}

/// Stores changes from `config.threads` threads. Thread `t` writes to
/// `o=writer<t>` as server `t + 1`.
pub fn concurrent_writes(changelog: &Arc<TestChangelog>, config: &WriterConfig) -> WriteRunResult {
    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let changelog = Arc::clone(changelog);
            let config = config.clone();
            thread::spawn(move || {
                let domain = format!("o=writer{t}");
                let server_id = u16::try_from(t + 1).expect("thread count fits a server id");
                (0..config.changes_per_thread)
                    .map(|_| {
                        let change = changelog.add_change(&domain, server_id);
                        if !config.pause.is_zero() {
                            thread::sleep(config.pause);
                        }
                        change
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut changes = Vec::new();
    for handle in handles {
        changes.extend(handle.join().expect("writer thread panicked"));
    }
    WriteRunResult {
        changes,
        duration: start.elapsed(),
    }
}
