//! Prediction submitter: acts in the closing seconds of each epoch.
//!
//! A prediction made during epoch `E` is for the slot two epochs ahead,
//! `(E + 2) * seconds_per_epoch`, the first slot still open for staking.

use serde::{Deserialize, Serialize};

use crate::chain::ChainClient;
use crate::clock::slot_of;
use crate::error::Result;
use crate::executor::{ActionExecutor, ExecutionMode, PlanInput, Planned};
use crate::gate::ActionWindow;
use crate::types::{Payload, PendingAction, SkipReason, Target};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelCall {
    pub predicted_up: bool,
    pub stake: f64,
}

/// Source of directional calls. `None` means the model abstains.
#[async_trait::async_trait]
pub trait PredictionModel: Send + Sync {
    async fn predict(&self, target: &Target, slot: u64) -> Result<Option<ModelCall>>;
}

/// Always the same call, whatever the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticModel {
    pub call: ModelCall,
}

#[async_trait::async_trait]
impl PredictionModel for StaticModel {
    async fn predict(&self, _target: &Target, _slot: u64) -> Result<Option<ModelCall>> {
        Ok(Some(self.call))
    }
}

pub struct Predictor<M> {
    model: M,
    window_seconds: u64,
}

impl<M: PredictionModel> Predictor<M> {
    pub fn new(model: M, window_seconds: u64) -> Self {
        Self {
            model,
            window_seconds,
        }
    }
}

#[async_trait::async_trait]
impl<M: PredictionModel> ActionExecutor for Predictor<M> {
    fn name(&self) -> &'static str {
        "predictor"
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Single
    }

    fn window(&self) -> ActionWindow {
        ActionWindow::Closing {
            seconds: self.window_seconds,
        }
    }

    async fn plan(&mut self, _chain: &dyn ChainClient, input: PlanInput<'_>) -> Result<Vec<Planned>> {
        let mut out = Vec::with_capacity(input.due.len());
        for due in input.due {
            let slot = slot_of(due.epoch + 2, due.target.seconds_per_epoch);
            let planned = match self.model.predict(&due.target, slot).await {
                Ok(Some(call)) if call.stake > 0.0 => {
                    tracing::info!(
                        addr = %due.target.address,
                        slot,
                        up = call.predicted_up,
                        stake = call.stake,
                        "prediction ready"
                    );
                    Planned::act(PendingAction::new(
                        due.target.address.clone(),
                        due.epoch,
                        slot,
                        Payload::Prediction {
                            predicted_up: call.predicted_up,
                            stake: call.stake,
                        },
                    ))
                }
                Ok(Some(_)) => Planned::skip(
                    due,
                    SkipReason::NoPayload {
                        detail: "zero stake".into(),
                    },
                ),
                Ok(None) => Planned::skip(
                    due,
                    SkipReason::NoPayload {
                        detail: "model abstained".into(),
                    },
                ),
                Err(e) => {
                    tracing::warn!(addr = %due.target.address, error = %e, "model failed");
                    Planned::skip(due, SkipReason::Unavailable {
                        detail: e.to_string(),
                    })
                }
            };
            out.push(planned);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::EpochPosition;
    use crate::executor::{DueTarget, Plan};
    use crate::sim::{SimChain, SimConfig};

    fn due(epoch: u64) -> DueTarget {
        DueTarget {
            target: Target::new("0xfeed", 300),
            epoch,
            position: EpochPosition::at(epoch * 300 + 250, 300).unwrap(),
        }
    }

    async fn plan_with(stake: f64) -> Vec<Planned> {
        let mut p = Predictor::new(
            StaticModel {
                call: ModelCall {
                    predicted_up: true,
                    stake,
                },
            },
            60,
        );
        let chain = SimChain::new(SimConfig::default());
        let due = [due(10)];
        p.plan(
            &chain,
            PlanInput {
                now: 3_250,
                due: &due,
                total_targets: 1,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn predicts_two_slots_ahead() {
        let planned = plan_with(2.5).await;
        match &planned[0].plan {
            Plan::Act(a) => {
                assert_eq!(a.epoch, 10);
                assert_eq!(a.slot, 12 * 300);
                assert_eq!(
                    a.payload,
                    Payload::Prediction {
                        predicted_up: true,
                        stake: 2.5
                    }
                );
            }
            other => panic!("expected action, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_stake_is_skipped() {
        let planned = plan_with(0.0).await;
        assert!(matches!(
            planned[0].plan,
            Plan::Skip(SkipReason::NoPayload { .. })
        ));
        assert_eq!(planned[0].epoch, 10);
    }

    #[test]
    fn acts_in_closing_window() {
        let p = Predictor::new(
            StaticModel {
                call: ModelCall {
                    predicted_up: false,
                    stake: 1.0,
                },
            },
            45,
        );
        assert_eq!(p.window(), ActionWindow::Closing { seconds: 45 });
        assert_eq!(p.mode(), ExecutionMode::Single);
    }
}
