//! Batch submission with a degrading fallback cascade.
//!
//! ```text
//! SUBMIT_BATCH ──ok──▶ SUCCESS (every action)
//!      │ reverted / retries exhausted
//!      ▼
//! SUBMIT_EACH (batches spanning two or more targets)
//!      │ reverted
//!      ▼
//! SPLIT_AND_RETRY (quantity >= 2, depth < max_split_depth) ──▶ halves
//!      │ otherwise
//!      ▼
//! permanent failure (logged once per piece)
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chain::{ChainClient, ChainError, Receipt};
use crate::types::{ActionResult, Outcome, PendingAction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitPolicy {
    /// Extra attempts after a transport error, per call.
    pub max_submit_retries: u32,
    pub retry_backoff: Duration,
    pub max_split_depth: u32,
    pub wait_for_receipt: bool,
}

impl Default for SubmitPolicy {
    fn default() -> Self {
        Self {
            max_submit_retries: 3,
            retry_backoff: Duration::from_secs(2),
            max_split_depth: 1,
            wait_for_receipt: true,
        }
    }
}

#[derive(Clone, Copy)]
enum Call<'a> {
    Batch(&'a [PendingAction]),
    Single(&'a PendingAction),
}

#[derive(Clone)]
enum Attempt {
    Confirmed(String),
    Reverted {
        tx_ref: Option<String>,
        reason: String,
    },
}

impl Attempt {
    fn outcome(&self) -> Outcome {
        match self {
            Self::Confirmed(tx) => Outcome::Success { tx_ref: tx.clone() },
            Self::Reverted { tx_ref, reason } => Outcome::Reverted {
                tx_ref: tx_ref.clone(),
                reason: reason.clone(),
            },
        }
    }
}

fn distinct_targets(batch: &[PendingAction]) -> usize {
    let mut seen: Vec<&str> = Vec::new();
    for a in batch {
        if !seen.contains(&a.target.as_str()) {
            seen.push(&a.target);
        }
    }
    seen.len()
}

type Pending<'a> = Pin<Box<dyn Future<Output = Vec<ActionResult>> + Send + 'a>>;

pub struct BatchSubmitter {
    policy: SubmitPolicy,
}

impl BatchSubmitter {
    pub fn new(policy: SubmitPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SubmitPolicy {
        &self.policy
    }

    /// Submit a batch, degrading to per-action and split submissions on revert.
    ///
    /// Returns one result per submitted piece; a split action yields one
    /// result per half.
    pub async fn submit_batch(
        &self,
        chain: &dyn ChainClient,
        batch: &[PendingAction],
    ) -> Vec<ActionResult> {
        match batch {
            [] => Vec::new(),
            [only] => self.submit_one(chain, only, 0).await,
            _ => {
                let attempt = self.attempt(chain, Call::Batch(batch)).await;
                if let Attempt::Confirmed(tx) = &attempt {
                    tracing::info!(actions = batch.len(), tx = %tx, "batch confirmed");
                    return batch
                        .iter()
                        .map(|a| ActionResult::new(a.clone(), attempt.outcome()))
                        .collect();
                }
                let mut results = Vec::with_capacity(batch.len());
                if distinct_targets(batch) < 2 {
                    // Resubmitting pieces of one target alone would revert the same way.
                    tracing::warn!(
                        actions = batch.len(),
                        "single-target batch failed, splitting its actions"
                    );
                    for action in batch {
                        results.extend(
                            self.split_or_fail(chain, action, 0, attempt.clone()).await,
                        );
                    }
                    return results;
                }
                tracing::warn!(
                    actions = batch.len(),
                    "batch failed, resubmitting actions one by one"
                );
                for action in batch {
                    results.extend(self.submit_one(chain, action, 0).await);
                }
                results
            }
        }
    }

    /// Submit one action on its own, splitting on revert when allowed.
    pub async fn submit_action(
        &self,
        chain: &dyn ChainClient,
        action: &PendingAction,
    ) -> Vec<ActionResult> {
        self.submit_one(chain, action, 0).await
    }

    fn submit_one<'a>(
        &'a self,
        chain: &'a dyn ChainClient,
        action: &'a PendingAction,
        depth: u32,
    ) -> Pending<'a> {
        Box::pin(async move {
            let attempt = self.attempt(chain, Call::Single(action)).await;
            match attempt {
                Attempt::Confirmed(_) => {
                    tracing::debug!(
                        addr = %action.target,
                        epoch = action.epoch,
                        size = action.size(),
                        depth,
                        "action confirmed"
                    );
                    vec![ActionResult::new(action.clone(), attempt.outcome())]
                }
                Attempt::Reverted { .. } => self.split_or_fail(chain, action, depth, attempt).await,
            }
        })
    }

    async fn split_or_fail(
        &self,
        chain: &dyn ChainClient,
        action: &PendingAction,
        depth: u32,
        failure: Attempt,
    ) -> Vec<ActionResult> {
        let q = action.size();
        if action.payload.is_splittable() && q >= 2 && depth < self.policy.max_split_depth {
            let low = action.with_units(q / 2);
            let high = action.with_units(q - q / 2);
            tracing::info!(
                addr = %action.target,
                epoch = action.epoch,
                units = q,
                depth,
                "splitting reverted action"
            );
            let mut results = self.submit_one(chain, &low, depth + 1).await;
            results.extend(self.submit_one(chain, &high, depth + 1).await);
            return results;
        }

        let outcome = failure.outcome();
        if let Outcome::Reverted { reason, .. } = &outcome {
            tracing::error!(
                addr = %action.target,
                epoch = action.epoch,
                size = q,
                depth,
                reason = %reason,
                "action failed permanently"
            );
        }
        vec![ActionResult::new(action.clone(), outcome)]
    }

    async fn attempt(&self, chain: &dyn ChainClient, call: Call<'_>) -> Attempt {
        let wait = self.policy.wait_for_receipt;
        let mut retries = 0;
        loop {
            let result: Result<Receipt, ChainError> = match call {
                Call::Batch(actions) => chain.submit_batch(actions, wait).await,
                Call::Single(action) => chain.submit_action(action, wait).await,
            };
            match result {
                Ok(receipt) if receipt.success => return Attempt::Confirmed(receipt.tx_hash),
                Ok(receipt) => {
                    return Attempt::Reverted {
                        tx_ref: Some(receipt.tx_hash),
                        reason: "transaction reverted".into(),
                    }
                }
                Err(e) if e.is_transient() && retries < self.policy.max_submit_retries => {
                    retries += 1;
                    tracing::warn!(
                        error = %e,
                        attempt = retries,
                        max = self.policy.max_submit_retries,
                        "submission failed, retrying"
                    );
                    tokio::time::sleep(self.policy.retry_backoff).await;
                }
                Err(e) => {
                    return Attempt::Reverted {
                        tx_ref: None,
                        reason: e.to_string(),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimChain, SimConfig};
    use crate::types::{Payload, Target};

    fn policy() -> SubmitPolicy {
        SubmitPolicy {
            retry_backoff: Duration::ZERO,
            ..SubmitPolicy::default()
        }
    }

    fn chain(config: SimConfig) -> SimChain {
        SimChain::new(SimConfig {
            targets: vec![
                Target::new("0xa", 300).with_price(1.0),
                Target::new("0xb", 300).with_price(1.0),
            ],
            ..config
        })
    }

    fn qty(target: &str, units: u64) -> PendingAction {
        PendingAction::new(target, 4, 1_200, Payload::Quantity { units })
    }

    fn successes(results: &[ActionResult]) -> u64 {
        results
            .iter()
            .filter(|r| r.outcome.is_success())
            .map(|r| r.action.size())
            .sum()
    }

    #[tokio::test]
    async fn whole_batch_succeeds() {
        let c = chain(SimConfig::default());
        let s = BatchSubmitter::new(policy());
        let results = s.submit_batch(&c, &[qty("0xa", 2), qty("0xb", 3)]).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.outcome.is_success()));
        assert_eq!(results[0].outcome.tx_ref(), results[1].outcome.tx_ref());
        assert_eq!(c.submissions().len(), 1);
    }

    #[tokio::test]
    async fn reverted_batch_falls_back_to_each() {
        let c = chain(SimConfig {
            max_tx_quantity: Some(4),
            ..SimConfig::default()
        });
        let s = BatchSubmitter::new(policy());
        let results = s.submit_batch(&c, &[qty("0xa", 2), qty("0xb", 3)]).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.outcome.is_success()));
        assert_eq!(c.submissions().len(), 3);
        assert_eq!(c.accepted().len(), 2);
    }

    #[tokio::test]
    async fn single_target_batch_goes_straight_to_split() {
        let c = chain(SimConfig {
            max_tx_quantity: Some(5),
            ..SimConfig::default()
        });
        let s = BatchSubmitter::new(policy());
        let results = s.submit_batch(&c, &[qty("0xa", 6), qty("0xa", 6)]).await;
        // one reverted batch, then 3 + 3 for each piece; no lone resubmission of 6
        assert_eq!(c.submissions().len(), 5);
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.action.size() == 3));
        assert_eq!(successes(&results), 12);
    }

    #[tokio::test]
    async fn oversized_action_is_split_in_halves() {
        let c = chain(SimConfig {
            max_tx_quantity: Some(5),
            ..SimConfig::default()
        });
        let s = BatchSubmitter::new(policy());
        let results = s.submit_batch(&c, &[qty("0xa", 9)]).await;
        let sizes: Vec<_> = results.iter().map(|r| r.action.size()).collect();
        assert_eq!(sizes, vec![4, 5]);
        assert_eq!(successes(&results), 9);
    }

    #[tokio::test]
    async fn split_depth_is_bounded() {
        let c = chain(SimConfig {
            max_tx_quantity: Some(2),
            ..SimConfig::default()
        });
        let s = BatchSubmitter::new(policy());
        let results = s.submit_batch(&c, &[qty("0xa", 9)]).await;
        // 9 -> 4 + 5, both still too large at depth 1
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.outcome.is_success()));
        let total: u64 = results.iter().map(|r| r.action.size()).sum();
        assert_eq!(total, 9);
    }

    #[tokio::test]
    async fn deeper_splits_when_allowed() {
        let c = chain(SimConfig {
            max_tx_quantity: Some(2),
            ..SimConfig::default()
        });
        let s = BatchSubmitter::new(SubmitPolicy {
            max_split_depth: 2,
            ..policy()
        });
        let results = s.submit_action(&c, &qty("0xa", 8)).await;
        assert_eq!(results.len(), 4);
        assert_eq!(successes(&results), 8);
    }

    #[tokio::test]
    async fn broken_target_fails_without_affecting_others() {
        let c = chain(SimConfig {
            reverting_targets: vec!["0xb".into()],
            ..SimConfig::default()
        });
        let s = BatchSubmitter::new(policy());
        let results = s.submit_batch(&c, &[qty("0xa", 3), qty("0xb", 4)]).await;
        let ok: Vec<_> = results.iter().filter(|r| r.outcome.is_success()).collect();
        let failed: Vec<_> = results.iter().filter(|r| !r.outcome.is_success()).collect();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].action.target, "0xa");
        // one permanent failure per half
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|r| r.action.target == "0xb"));
    }

    #[tokio::test]
    async fn fixed_payload_is_never_split() {
        let c = chain(SimConfig {
            reverting_targets: vec!["0xa".into()],
            ..SimConfig::default()
        });
        let s = BatchSubmitter::new(policy());
        let action = PendingAction::new(
            "0xa",
            4,
            1_800,
            Payload::Prediction {
                predicted_up: true,
                stake: 1.0,
            },
        );
        let results = s.submit_action(&c, &action).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome.label(), "REVERTED");
        assert_eq!(c.submissions().len(), 1);
    }

    #[tokio::test]
    async fn transport_errors_are_retried() {
        let c = chain(SimConfig {
            transport_failures: 2,
            ..SimConfig::default()
        });
        let s = BatchSubmitter::new(policy());
        let results = s.submit_action(&c, &qty("0xa", 1)).await;
        assert!(results[0].outcome.is_success());
    }

    #[tokio::test]
    async fn exhausted_retries_count_as_reverted() {
        let c = chain(SimConfig {
            transport_failures: 10,
            ..SimConfig::default()
        });
        let s = BatchSubmitter::new(SubmitPolicy {
            max_submit_retries: 1,
            ..policy()
        });
        let results = s.submit_action(&c, &qty("0xa", 1)).await;
        match &results[0].outcome {
            Outcome::Reverted { tx_ref, reason } => {
                assert!(tx_ref.is_none());
                assert!(reason.contains("transport"));
            }
            other => panic!("expected revert, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_batch_submits_nothing() {
        let c = chain(SimConfig::default());
        let s = BatchSubmitter::new(policy());
        assert!(s.submit_batch(&c, &[]).await.is_empty());
        assert!(c.submissions().is_empty());
    }
}
