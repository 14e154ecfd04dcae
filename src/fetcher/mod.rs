use std::fmt;

use tracing::info;

use crate::node_client::Error;

pub mod blocks;
pub mod pool;
pub mod transactions;

pub use blocks::{fetch_blocks, fetch_latest_blocks, get_chain_height, plan_heights};
pub use transactions::{collect_txids, fetch_transactions};

/// Why an item was left out of a fetch batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// The node has no data for it (unindexed transaction, empty output)
    Missing,
    /// The node answered with something that is not the expected JSON
    Malformed,
    /// The CLI could not be run or exited with an error
    Failed,
}

impl From<&Error> for Skip {
    fn from(e: &Error) -> Self {
        match e {
            e if e.is_soft_miss() => Skip::Missing,
            Error::MalformedResponse { .. } => Skip::Malformed,
            _ => Skip::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub requested: usize,
    pub fetched: usize,
    pub missing: usize,
    pub malformed: usize,
    pub failed: usize,
}

impl FetchReport {
    pub fn new(requested: usize) -> Self {
        Self {
            requested,
            ..Default::default()
        }
    }

    pub fn record_fetched(&mut self) {
        self.fetched += 1;
    }

    pub fn record_skip(&mut self, skip: Skip) {
        match skip {
            Skip::Missing => self.missing += 1,
            Skip::Malformed => self.malformed += 1,
            Skip::Failed => self.failed += 1,
        }
    }

    pub fn completed(&self) -> usize {
        self.fetched + self.missing + self.malformed + self.failed
    }

    /// True when dispatch stopped before every requested item was attempted.
    pub fn interrupted(&self) -> bool {
        self.completed() < self.requested
    }

    fn log_progress(&self, what: &str, key: &dyn fmt::Display) {
        let done = self.completed();
        if done % 10 == 0 || done == self.requested {
            let percentage = done as f64 / self.requested.max(1) as f64 * 100.0;
            info!(
                "Retrieved {} {} ({}/{}) - {:.2}% complete",
                what, key, done, self.requested, percentage
            );
        }
    }
}

impl fmt::Display for FetchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} fetched, {} missing, {} malformed, {} failed",
            self.fetched, self.requested, self.missing, self.malformed, self.failed
        )
    }
}
