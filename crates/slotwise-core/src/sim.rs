//! In-memory [`ChainClient`] with a block-time clock.
//!
//! Every `latest_block` call mines one block `block_time` seconds after the
//! previous one. Submissions are checked against a small set of failure
//! rules and recorded so callers can inspect what reached the "chain".

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::chain::{Block, ChainClient, ChainError, Receipt, TargetFilter};
use crate::types::{Payload, PendingAction, Target};

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    /// Timestamp of block 0.
    #[serde(default = "default_start_time")]
    pub start_time: u64,
    #[serde(default = "default_block_time")]
    pub block_time: u64,
    #[serde(default)]
    pub targets: Vec<Target>,
    /// Transactions carrying more quantity than this revert.
    #[serde(default)]
    pub max_tx_quantity: Option<u64>,
    /// Any transaction touching one of these targets reverts.
    #[serde(default)]
    pub reverting_targets: Vec<String>,
    /// Number of submissions that fail with a transport error before the
    /// chain starts answering.
    #[serde(default)]
    pub transport_failures: u32,
    /// Report `seconds_per_epoch: 0` from discovery; the real value is
    /// still served by `seconds_per_epoch`.
    #[serde(default)]
    pub hide_epoch_length: bool,
    /// Consumption already on chain at `start_time`, per target.
    #[serde(default)]
    pub consumed: BTreeMap<String, f64>,
}

fn default_start_time() -> u64 {
    1_700_000_000
}

fn default_block_time() -> u64 {
    12
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_time: default_start_time(),
            block_time: default_block_time(),
            targets: Vec::new(),
            max_tx_quantity: None,
            reverting_targets: Vec::new(),
            transport_failures: 0,
            hide_epoch_length: false,
            consumed: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// One transaction the simulated chain mined.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub tx_hash: String,
    pub block: u64,
    pub timestamp: u64,
    pub actions: Vec<PendingAction>,
    pub success: bool,
}

struct Spend {
    target: String,
    timestamp: u64,
    amount: f64,
}

struct SimState {
    block: Block,
    hold: bool,
    transport_failures: u32,
    next_tx: u64,
    submissions: Vec<Submission>,
    spends: Vec<Spend>,
}

// ---------------------------------------------------------------------------
// SimChain
// ---------------------------------------------------------------------------

pub struct SimChain {
    targets: Vec<Target>,
    max_tx_quantity: Option<u64>,
    reverting: BTreeSet<String>,
    block_time: u64,
    hide_epoch_length: bool,
    state: Mutex<SimState>,
}

impl SimChain {
    pub fn new(config: SimConfig) -> Self {
        let spends = config
            .consumed
            .iter()
            .map(|(target, &amount)| Spend {
                target: target.clone(),
                timestamp: config.start_time,
                amount,
            })
            .collect();
        Self {
            targets: config.targets,
            max_tx_quantity: config.max_tx_quantity,
            reverting: config
                .reverting_targets
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            block_time: config.block_time,
            hide_epoch_length: config.hide_epoch_length,
            state: Mutex::new(SimState {
                block: Block {
                    number: 0,
                    timestamp: config.start_time,
                },
                hold: false,
                transport_failures: config.transport_failures,
                next_tx: 1,
                submissions: Vec::new(),
                spends,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        // A poisoned lock only means a test thread panicked mid-call; the
        // state itself is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stop (or resume) mining: `latest_block` keeps returning the same block.
    pub fn hold_block(&self, hold: bool) {
        self.state().hold = hold;
    }

    /// Jump the clock to `timestamp`, mining one block.
    pub fn set_time(&self, timestamp: u64) {
        let mut s = self.state();
        s.block.number += 1;
        s.block.timestamp = timestamp;
    }

    pub fn fail_next_submissions(&self, n: u32) {
        self.state().transport_failures = n;
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    /// Successful submissions only.
    pub fn accepted(&self) -> Vec<Submission> {
        self.state()
            .submissions
            .iter()
            .filter(|s| s.success)
            .cloned()
            .collect()
    }

    fn find(&self, address: &str) -> Option<&Target> {
        self.targets
            .iter()
            .find(|t| t.address.eq_ignore_ascii_case(address))
    }

    fn mine(&self, actions: &[PendingAction]) -> Result<Receipt, ChainError> {
        for a in actions {
            if self.find(&a.target).is_none() {
                return Err(ChainError::Rejected(format!("unknown target {}", a.target)));
            }
        }

        let mut s = self.state();
        if s.transport_failures > 0 {
            s.transport_failures -= 1;
            return Err(ChainError::Transport("connection reset by peer".into()));
        }

        let quantity: u64 = actions
            .iter()
            .filter(|a| a.payload.is_splittable())
            .map(|a| a.size())
            .sum();
        let too_large = self.max_tx_quantity.is_some_and(|max| quantity > max);
        let hits_broken = actions
            .iter()
            .any(|a| self.reverting.contains(&a.target.to_ascii_lowercase()));
        let success = !too_large && !hits_broken;

        let tx_hash = format!("0x{:064x}", s.next_tx);
        s.next_tx += 1;
        let Block { number, timestamp } = s.block;

        if success {
            for a in actions {
                if let Payload::Quantity { units } = a.payload {
                    let price = self.find(&a.target).and_then(|t| t.price).unwrap_or(1.0);
                    s.spends.push(Spend {
                        target: a.target.clone(),
                        timestamp,
                        amount: units as f64 * price,
                    });
                }
            }
        }
        s.submissions.push(Submission {
            tx_hash: tx_hash.clone(),
            block: number,
            timestamp,
            actions: actions.to_vec(),
            success,
        });

        Ok(Receipt { tx_hash, success })
    }
}

#[async_trait::async_trait]
impl ChainClient for SimChain {
    async fn latest_block(&self) -> Result<Block, ChainError> {
        let mut s = self.state();
        if !s.hold {
            s.block.number += 1;
            s.block.timestamp += self.block_time;
        }
        Ok(s.block)
    }

    async fn discover_targets(&self, filter: &TargetFilter) -> Result<Vec<Target>, ChainError> {
        Ok(self
            .targets
            .iter()
            .filter(|t| filter.matches(t))
            .map(|t| {
                let mut t = t.clone();
                if self.hide_epoch_length {
                    t.seconds_per_epoch = 0;
                }
                t
            })
            .collect())
    }

    async fn current_epoch(&self, target: &Target) -> Result<u64, ChainError> {
        let spe = self.seconds_per_epoch(target).await?;
        if spe == 0 {
            return Err(ChainError::NotFound(format!(
                "{} has no epoch length",
                target.address
            )));
        }
        Ok(self.state().block.timestamp / spe)
    }

    async fn seconds_per_epoch(&self, target: &Target) -> Result<u64, ChainError> {
        self.find(&target.address)
            .map(|t| t.seconds_per_epoch)
            .ok_or_else(|| ChainError::NotFound(target.address.clone()))
    }

    async fn submit_action(
        &self,
        action: &PendingAction,
        _wait_for_receipt: bool,
    ) -> Result<Receipt, ChainError> {
        self.mine(std::slice::from_ref(action))
    }

    async fn submit_batch(
        &self,
        actions: &[PendingAction],
        _wait_for_receipt: bool,
    ) -> Result<Receipt, ChainError> {
        self.mine(actions)
    }

    async fn observed_consumed(
        &self,
        target: &Target,
        window_start: u64,
    ) -> Result<f64, ChainError> {
        Ok(self
            .state()
            .spends
            .iter()
            .filter(|s| s.timestamp >= window_start && s.target.eq_ignore_ascii_case(&target.address))
            .map(|s| s.amount)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(config: SimConfig) -> SimChain {
        SimChain::new(SimConfig {
            targets: vec![
                Target::new("0xa", 300).with_price(2.0),
                Target::new("0xb", 300).with_price(1.0),
            ],
            ..config
        })
    }

    fn qty(target: &str, units: u64) -> PendingAction {
        PendingAction::new(target, 1, 300, Payload::Quantity { units })
    }

    #[tokio::test]
    async fn blocks_advance_by_block_time() {
        let c = chain(SimConfig::default());
        let b1 = c.latest_block().await.unwrap();
        let b2 = c.latest_block().await.unwrap();
        assert_eq!(b2.number, b1.number + 1);
        assert_eq!(b2.timestamp, b1.timestamp + 12);
    }

    #[tokio::test]
    async fn held_block_does_not_advance() {
        let c = chain(SimConfig::default());
        let b1 = c.latest_block().await.unwrap();
        c.hold_block(true);
        assert_eq!(c.latest_block().await.unwrap(), b1);
    }

    #[tokio::test]
    async fn oversized_batch_reverts() {
        let c = chain(SimConfig {
            max_tx_quantity: Some(5),
            ..SimConfig::default()
        });
        let r = c.submit_batch(&[qty("0xa", 3), qty("0xb", 3)], true).await.unwrap();
        assert!(!r.success);
        let r = c.submit_action(&qty("0xa", 3), true).await.unwrap();
        assert!(r.success);
        assert_eq!(c.submissions().len(), 2);
        assert_eq!(c.accepted().len(), 1);
    }

    #[tokio::test]
    async fn consumption_is_priced_and_windowed() {
        let c = chain(SimConfig {
            consumed: BTreeMap::from([("0xa".to_string(), 4.0)]),
            ..SimConfig::default()
        });
        c.set_time(1_700_000_100);
        c.submit_action(&qty("0xa", 3), true).await.unwrap();
        let t = Target::new("0xa", 300);
        assert_eq!(c.observed_consumed(&t, 0).await.unwrap(), 10.0);
        assert_eq!(c.observed_consumed(&t, 1_700_000_050).await.unwrap(), 6.0);
    }

    #[tokio::test]
    async fn scripted_transport_failures() {
        let c = chain(SimConfig {
            transport_failures: 1,
            ..SimConfig::default()
        });
        let err = c.submit_action(&qty("0xa", 1), true).await.unwrap_err();
        assert!(err.is_transient());
        assert!(c.submit_action(&qty("0xa", 1), true).await.unwrap().success);
    }

    #[tokio::test]
    async fn unknown_target_is_rejected() {
        let c = chain(SimConfig::default());
        let err = c.submit_action(&qty("0xdead", 1), true).await.unwrap_err();
        assert!(matches!(err, ChainError::Rejected(_)));
    }

    #[tokio::test]
    async fn hidden_epoch_length_is_still_queryable() {
        let c = chain(SimConfig {
            hide_epoch_length: true,
            ..SimConfig::default()
        });
        let found = c.discover_targets(&TargetFilter::default()).await.unwrap();
        assert_eq!(found[0].seconds_per_epoch, 0);
        assert_eq!(c.seconds_per_epoch(&found[0]).await.unwrap(), 300);
    }
}
