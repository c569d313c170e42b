use alloy_primitives::U256;

use crate::types::Transfer;

/// Admits value transfers whose amount lies in `[min_value, max_value]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferFilter {
    min_value: U256,
    max_value: U256,
}

impl TransferFilter {
    pub fn new(min_value: U256, max_value: U256) -> Self {
        Self {
            min_value,
            max_value,
        }
    }

    /// Both bounds inclusive; contract creations (no recipient) never pass.
    pub fn accepts(&self, transfer: &Transfer) -> bool {
        transfer.to.is_some() && self.in_range(transfer.value)
    }

    pub fn in_range(&self, value: U256) -> bool {
        self.min_value <= value && value <= self.max_value
    }
}
