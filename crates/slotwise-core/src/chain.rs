//! The narrow chain-facing interface the scheduler consumes.
//!
//! RPC transport, ABI encoding and subgraph queries live behind
//! [`ChainClient`]. [`crate::sim::SimChain`] is the in-memory implementation
//! used by the CLI's `sim` backend and by tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{PendingAction, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    /// Unix seconds.
    pub timestamp: u64,
}

/// Result of a mined (or at least accepted) transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: String,
    /// `false` means the transaction was mined but the contract reverted.
    pub success: bool,
}

impl Receipt {
    pub fn success(tx_hash: impl Into<String>) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            success: true,
        }
    }

    pub fn reverted(tx_hash: impl Into<String>) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            success: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// RPC or network failure; worth retrying.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node refused the transaction outright (e.g. failed gas estimation).
    /// Treated like a revert by the submitter.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl ChainError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Restricts which discovered targets an agent works on.
///
/// Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetFilter {
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub pairs: Vec<String>,
}

impl TargetFilter {
    pub fn matches(&self, target: &Target) -> bool {
        let addr_ok = self.addresses.is_empty()
            || self
                .addresses
                .iter()
                .any(|a| a.eq_ignore_ascii_case(&target.address));
        let pair_ok = self.pairs.is_empty()
            || target.pair.as_ref().is_some_and(|p| {
                self.pairs.iter().any(|want| want.eq_ignore_ascii_case(p))
            });
        addr_ok && pair_ok
    }
}

/// Everything the scheduler needs from the chain.
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    async fn latest_block(&self) -> Result<Block, ChainError>;

    async fn discover_targets(&self, filter: &TargetFilter) -> Result<Vec<Target>, ChainError>;

    /// The contract's own epoch counter.
    async fn current_epoch(&self, target: &Target) -> Result<u64, ChainError>;

    async fn seconds_per_epoch(&self, target: &Target) -> Result<u64, ChainError>;

    async fn submit_action(
        &self,
        action: &PendingAction,
        wait_for_receipt: bool,
    ) -> Result<Receipt, ChainError>;

    /// Submit every action in one transaction.
    async fn submit_batch(
        &self,
        actions: &[PendingAction],
        wait_for_receipt: bool,
    ) -> Result<Receipt, ChainError>;

    /// Amount consumed from `target` by this account since `window_start`.
    async fn observed_consumed(&self, target: &Target, window_start: u64)
        -> Result<f64, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_all() {
        let f = TargetFilter::default();
        assert!(f.matches(&Target::new("0xabc", 300)));
    }

    #[test]
    fn address_filter_is_case_insensitive() {
        let f = TargetFilter {
            addresses: vec!["0xABC".into()],
            pairs: vec![],
        };
        assert!(f.matches(&Target::new("0xabc", 300)));
        assert!(!f.matches(&Target::new("0xdef", 300)));
    }

    #[test]
    fn pair_filter_requires_a_pair() {
        let f = TargetFilter {
            addresses: vec![],
            pairs: vec!["BTC/USDT".into()],
        };
        assert!(f.matches(&Target::new("0x1", 300).with_pair("btc/usdt")));
        assert!(!f.matches(&Target::new("0x2", 300)));
        assert!(!f.matches(&Target::new("0x3", 300).with_pair("ETH/USDT")));
    }

    #[test]
    fn only_transport_errors_are_transient() {
        assert!(ChainError::Transport("timeout".into()).is_transient());
        assert!(!ChainError::Rejected("gas".into()).is_transient());
    }
}
