//! Trader: acts early in each epoch on the aggregated prediction for the
//! next slot.

use serde::{Deserialize, Serialize};

use crate::chain::ChainClient;
use crate::clock::slot_of;
use crate::error::Result;
use crate::executor::{ActionExecutor, ExecutionMode, PlanInput, Planned};
use crate::gate::ActionWindow;
use crate::types::{Payload, PendingAction, SkipReason, Target};

/// Stake-weighted consensus for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub go_long: bool,
    /// In `[0, 1]`.
    pub confidence: f64,
}

#[async_trait::async_trait]
pub trait SignalSource: Send + Sync {
    /// `None` when no aggregate exists for `slot` yet.
    async fn aggregate(&self, target: &Target, slot: u64) -> Result<Option<Signal>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticSignal(pub Signal);

#[async_trait::async_trait]
impl SignalSource for StaticSignal {
    async fn aggregate(&self, _target: &Target, _slot: u64) -> Result<Option<Signal>> {
        Ok(Some(self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraderSettings {
    pub min_seconds_left: u64,
    pub min_confidence: f64,
    pub position_size: f64,
}

pub struct Trader<S> {
    source: S,
    settings: TraderSettings,
}

impl<S: SignalSource> Trader<S> {
    pub fn new(source: S, settings: TraderSettings) -> Self {
        Self { source, settings }
    }
}

#[async_trait::async_trait]
impl<S: SignalSource> ActionExecutor for Trader<S> {
    fn name(&self) -> &'static str {
        "trader"
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Single
    }

    fn window(&self) -> ActionWindow {
        ActionWindow::Opening {
            min_seconds_left: self.settings.min_seconds_left,
        }
    }

    async fn plan(&mut self, _chain: &dyn ChainClient, input: PlanInput<'_>) -> Result<Vec<Planned>> {
        let mut out = Vec::with_capacity(input.due.len());
        for due in input.due {
            let slot = slot_of(due.epoch + 1, due.target.seconds_per_epoch);
            let signal = match self.source.aggregate(&due.target, slot).await {
                Ok(Some(s)) => s,
                Ok(None) => {
                    out.push(Planned::skip(due, SkipReason::NoPayload {
                        detail: format!("no aggregate for slot {slot}"),
                    }));
                    continue;
                }
                Err(e) => {
                    tracing::warn!(addr = %due.target.address, error = %e, "signal unavailable");
                    out.push(Planned::skip(due, SkipReason::Unavailable {
                        detail: e.to_string(),
                    }));
                    continue;
                }
            };

            if signal.confidence < self.settings.min_confidence {
                out.push(Planned::skip(due, SkipReason::NoPayload {
                    detail: format!(
                        "confidence {:.2} below {:.2}",
                        signal.confidence, self.settings.min_confidence
                    ),
                }));
                continue;
            }

            tracing::info!(
                addr = %due.target.address,
                slot,
                long = signal.go_long,
                confidence = signal.confidence,
                "trade signal"
            );
            out.push(Planned::act(PendingAction::new(
                due.target.address.clone(),
                due.epoch,
                slot,
                Payload::Trade {
                    go_long: signal.go_long,
                    confidence: signal.confidence,
                    size: self.settings.position_size,
                },
            )));
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

    fn settings() -> TraderSettings {
        TraderSettings {
            min_seconds_left: 60,
            min_confidence: 0.55,
            position_size: 3.0,
        }
    }

    async fn plan_with(confidence: f64) -> Planned {
        let mut t = Trader::new(
            StaticSignal(Signal {
                go_long: false,
                confidence,
            }),
            settings(),
        );
        let due = [DueTarget {
            target: Target::new("0xfeed", 300),
            epoch: 4,
            position: EpochPosition::at(1_210, 300).unwrap(),
        }];
        let chain = SimChain::new(SimConfig::default());
        let mut planned = t
            .plan(
                &chain,
                PlanInput {
                    now: 1_210,
                    due: &due,
                    total_targets: 1,
                },
            )
            .await
            .unwrap();
        planned.remove(0)
    }

    #[tokio::test]
    async fn trades_next_slot_signal() {
        match plan_with(0.8).await.plan {
            Plan::Act(a) => {
                assert_eq!(a.slot, 1_500);
                assert_eq!(a.epoch, 4);
                assert_eq!(
                    a.payload,
                    Payload::Trade {
                        go_long: false,
                        confidence: 0.8,
                        size: 3.0
                    }
                );
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn low_confidence_is_skipped() {
        let planned = plan_with(0.5).await;
        match planned.plan {
            Plan::Skip(SkipReason::NoPayload { detail }) => {
                assert!(detail.contains("below"));
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn acts_in_opening_window() {
        let t = Trader::new(
            StaticSignal(Signal {
                go_long: true,
                confidence: 1.0,
            }),
            settings(),
        );
        assert_eq!(
            t.window(),
            ActionWindow::Opening {
                min_seconds_left: 60
            }
        );
    }
}
