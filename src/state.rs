use std::collections::{HashMap, HashSet};

use alloy_primitives::{Address, U256};
use tracing::debug;

use crate::config::DetectorConfig;
use crate::engine::{chain_is_similar, extends_streak};
use crate::types::{SimilarityPolicy, SuspicionVerdict};

/// Per-run aggregation of in-range transfers, keyed by sender.
///
/// Owned by the poll loop and rebuilt on every start; nothing here outlives
/// the process.
pub struct AddressLedger {
    min_transfer_count: usize,
    similarity_epsilon: U256,
    policy: SimilarityPolicy,
    /// Tracked amounts per sender, in block-scan order. Never pruned.
    tracked: HashMap<Address, Vec<U256>>,
    /// Senders that already produced a verdict.
    alerted: HashSet<Address>,
}

impl AddressLedger {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            min_transfer_count: config.min_transfer_count,
            similarity_epsilon: config.similarity_epsilon,
            policy: config.policy,
            tracked: HashMap::new(),
            alerted: HashSet::new(),
        }
    }

    pub fn policy(&self) -> SimilarityPolicy {
        self.policy
    }

    /// Record an in-range transfer sent by `address`.
    ///
    /// Returns a verdict the first time the address satisfies the active
    /// policy, and `None` on every later call for that address. Alerted
    /// addresses keep accumulating so their history stays observable.
    pub fn record(&mut self, address: Address, value: U256) -> Option<SuspicionVerdict> {
        let history = self.tracked.entry(address).or_default();

        if self.policy == SimilarityPolicy::Incremental
            && !extends_streak(history.last().copied(), value, self.similarity_epsilon)
        {
            debug!("{address}: transfer of {value} wei breaks the similarity streak, not counted");
            return None;
        }
        history.push(value);

        if self.alerted.contains(&address) || history.len() < self.min_transfer_count {
            return None;
        }

        if self.policy == SimilarityPolicy::Retrospective
            && !chain_is_similar(history, self.similarity_epsilon)
        {
            debug!(
                "{address}: {} transfers tracked but amounts are not similar",
                history.len()
            );
            return None;
        }

        let verdict = SuspicionVerdict {
            address,
            count: history.len(),
            transfers: history.clone(),
        };
        self.alerted.insert(address);
        Some(verdict)
    }

    /// Tracked amounts for `address`, oldest first.
    pub fn tracked(&self, address: &Address) -> Option<&[U256]> {
        self.tracked.get(address).map(Vec::as_slice)
    }

    pub fn is_alerted(&self, address: &Address) -> bool {
        self.alerted.contains(address)
    }

    pub fn tracked_addresses(&self) -> usize {
        self.tracked.len()
    }

    pub fn alerted_addresses(&self) -> usize {
        self.alerted.len()
    }
}
