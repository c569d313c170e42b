use std::fmt;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// A native-coin transfer extracted from a block's transaction list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub from: Address,
    /// `None` for contract-creation transactions.
    pub to: Option<Address>,
    /// Value in base units (wei).
    pub value: U256,
}

/// How repeated transfers from one sender are judged "similar".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityPolicy {
    /// Accumulate everything; once the count threshold is reached, require the
    /// whole history to be adjacent-similar. Re-checked on every new transfer.
    Retrospective,
    /// Only accumulate a transfer when it is similar to the previous one.
    Incremental,
    /// No similarity check at all.
    CountOnly,
}

impl SimilarityPolicy {
    pub fn label(&self) -> &'static str {
        match self {
            SimilarityPolicy::Retrospective => "retrospective",
            SimilarityPolicy::Incremental => "incremental",
            SimilarityPolicy::CountOnly => "count-only",
        }
    }
}

impl fmt::Display for SimilarityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for SimilarityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "retrospective" | "a" => Ok(SimilarityPolicy::Retrospective),
            "incremental" | "b" => Ok(SimilarityPolicy::Incremental),
            "count-only" | "count_only" | "c" => Ok(SimilarityPolicy::CountOnly),
            other => Err(format!(
                "unknown similarity policy '{other}' (expected retrospective, incremental or count-only)"
            )),
        }
    }
}

/// One-time decision that an address is suspicious, with its evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspicionVerdict {
    pub address: Address,
    pub count: usize,
    /// Tracked amounts in block-scan order.
    pub transfers: Vec<U256>,
}

/// Serialized form of a verdict as appended to the alert log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub address: String,
    pub transfer_count: usize,
    /// Whole-coin decimal strings, e.g. `"0.02"`.
    pub transfers: Vec<String>,
    pub block_number: u64,
    pub chain: String,
    /// RFC 3339 timestamp
    pub detected_at: String,
}

/// Counters accumulated by the poll loop over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub blocks_processed: u64,
    pub skipped_blocks: Vec<u64>,
    pub transfers_seen: u64,
    pub transfers_matched: u64,
    pub alerts_raised: u64,
    pub alerts_lost: u64,
}

/// Final status emitted when the tracker stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitSummary {
    pub chain: String,
    pub policy: SimilarityPolicy,
    pub checkpoint: u64,
    pub ticks: u64,
    pub failed_ticks: u64,
    pub blocks_processed: u64,
    pub blocks_skipped: u64,
    pub skipped_heights: Vec<u64>,
    pub transfers_seen: u64,
    pub transfers_matched: u64,
    pub tracked_addresses: usize,
    pub alerts_raised: u64,
    pub alerts_lost: u64,
}
