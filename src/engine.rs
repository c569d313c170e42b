use alloy_primitives::U256;

use crate::amount::abs_diff;

/// Two amounts are similar when they differ by at most `epsilon`.
pub fn is_similar(a: U256, b: U256, epsilon: U256) -> bool {
    abs_diff(a, b) <= epsilon
}

/// Every amount is similar to the one right before it.
///
/// Adjacent comparison only, so a slow drift of `epsilon` per step passes
/// even though the first and last amounts may be far apart.
pub fn chain_is_similar(amounts: &[U256], epsilon: U256) -> bool {
    amounts
        .windows(2)
        .all(|pair| is_similar(pair[0], pair[1], epsilon))
}

/// Whether `candidate` may extend a history whose latest amount is `last`.
///
/// An empty history always accepts.
pub fn extends_streak(last: Option<U256>, candidate: U256, epsilon: U256) -> bool {
    match last {
        Some(prev) => is_similar(prev, candidate, epsilon),
        None => true,
    }
}
