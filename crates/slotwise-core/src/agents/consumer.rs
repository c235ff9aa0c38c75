//! Consumption buyer: tops every target up to its share of the weekly
//! budget, once per consumption interval.
//!
//! The gate runs on the interval grid rather than the feed's epochs, so the
//! "epoch" recorded for a target is the index of the interval it was
//! topped up in.

use crate::chain::ChainClient;
use crate::clock::slot_of;
use crate::error::Result;
use crate::executor::{ActionExecutor, ExecutionMode, PlanInput, Planned};
use crate::gate::ActionWindow;
use crate::quota::QuotaCalculator;
use crate::report::CycleReport;
use crate::types::{Payload, PendingAction, SkipReason, Target};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumerSettings {
    pub weekly_budget: f64,
    pub grace_seconds: u64,
    pub failure_backoff_seconds: u64,
    /// Failed cycles tolerated before the batch size shrinks.
    pub shrink_after_failures: u32,
    pub min_batch_size: u64,
    /// Batch size before any shrinking.
    pub max_batch_size: u64,
}

pub struct Consumer {
    quota: QuotaCalculator,
    settings: ConsumerSettings,
    failed_cycles: u32,
    batch_size: u64,
}

impl Consumer {
    pub fn new(quota: QuotaCalculator, settings: ConsumerSettings) -> Self {
        Self {
            quota,
            settings,
            failed_cycles: 0,
            batch_size: settings.max_batch_size,
        }
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    async fn plan_target(
        &self,
        chain: &dyn ChainClient,
        target: &Target,
        epoch: u64,
        now: u64,
        total_targets: usize,
    ) -> std::result::Result<PendingAction, SkipReason> {
        let Some(price) = target.price.filter(|p| *p > 0.0) else {
            tracing::warn!(addr = %target.address, "no unit price, skipping");
            return Err(SkipReason::Unavailable {
                detail: "no unit price".into(),
            });
        };

        let week_start = self.quota.week_start(now);
        let consumed = chain
            .observed_consumed(target, week_start)
            .await
            .map_err(|e| SkipReason::Unavailable {
                detail: e.to_string(),
            })?;

        let q = self.quota.assess(
            now,
            self.settings.weekly_budget,
            total_targets,
            consumed,
            price,
        );
        tracing::debug!(
            addr = %target.address,
            expected = q.expected,
            consumed = q.consumed,
            shortfall = q.shortfall,
            units = q.units,
            "quota assessed"
        );
        if q.units == 0 {
            return Err(SkipReason::NoPayload {
                detail: format!("quota met ({:.2} of {:.2})", q.consumed, q.expected),
            });
        }

        Ok(PendingAction::new(
            target.address.clone(),
            epoch,
            slot_of(epoch, self.quota.interval_seconds()),
            Payload::Quantity { units: q.units },
        ))
    }
}

#[async_trait::async_trait]
impl ActionExecutor for Consumer {
    fn name(&self) -> &'static str {
        "consumer"
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Batched
    }

    fn window(&self) -> ActionWindow {
        ActionWindow::Always
    }

    fn cadence(&self, _target: &Target) -> u64 {
        self.quota.interval_seconds()
    }

    async fn plan(&mut self, chain: &dyn ChainClient, input: PlanInput<'_>) -> Result<Vec<Planned>> {
        let mut out = Vec::with_capacity(input.due.len());
        for due in input.due {
            let planned = match self
                .plan_target(chain, &due.target, due.epoch, input.now, input.total_targets)
                .await
            {
                Ok(action) => Planned::act(action),
                Err(reason) => Planned::skip(due, reason),
            };
            out.push(planned);
        }
        Ok(out)
    }

    fn on_cycle(&mut self, report: &CycleReport) {
        if report.failures() == 0 {
            self.failed_cycles = 0;
            return;
        }
        self.failed_cycles += 1;
        let current = self.batch_size;
        if self.failed_cycles > self.settings.shrink_after_failures
            && current > self.settings.min_batch_size
        {
            let shrunk = (current * 2 / 3).max(self.settings.min_batch_size);
            tracing::warn!(
                from = current,
                to = shrunk,
                failed_cycles = self.failed_cycles,
                "shrinking batch size"
            );
            self.batch_size = shrunk;
            self.failed_cycles = 0;
        }
    }

    fn next_wake(&self, now: u64, report: &CycleReport) -> Option<u64> {
        if report.failures() > 0 {
            Some(now + self.settings.failure_backoff_seconds)
        } else {
            Some(self.quota.next_interval_start(now) + self.settings.grace_seconds)
        }
    }

    /// The cumulative quota of the next interval already covers whatever a
    /// failed interval left unbought.
    fn reports_missed_windows(&self) -> bool {
        false
    }

    fn max_batch_size(&self, configured: u64) -> u64 {
        self.batch_size.min(configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Block;
    use crate::clock::EpochPosition;
    use crate::executor::{DueTarget, Plan};
    use crate::quota::{DAY_SECONDS, WEEK_SECONDS};
    use crate::sim::{SimChain, SimConfig};
    use crate::types::{ActionResult, Outcome};
    use std::collections::BTreeMap;

    fn settings() -> ConsumerSettings {
        ConsumerSettings {
            weekly_budget: 140.0,
            grace_seconds: 60,
            failure_backoff_seconds: 60,
            shrink_after_failures: 3,
            min_batch_size: 6,
            max_batch_size: 20,
        }
    }

    fn consumer() -> Consumer {
        Consumer::new(QuotaCalculator::default(), settings())
    }

    fn due(target: Target, now: u64) -> DueTarget {
        DueTarget {
            epoch: now / DAY_SECONDS,
            position: EpochPosition::at(now, DAY_SECONDS).unwrap(),
            target,
        }
    }

    fn failed_report() -> CycleReport {
        let mut r = CycleReport::new("consumer", Block {
            number: 1,
            timestamp: 0,
        });
        r.push(ActionResult::new(
            PendingAction::new("0xa", 1, 0, Payload::Quantity { units: 1 }),
            Outcome::Reverted {
                tx_ref: None,
                reason: "transaction reverted".into(),
            },
        ));
        r
    }

    #[tokio::test]
    async fn buys_units_to_cover_shortfall() {
        let now = WEEK_SECONDS + DAY_SECONDS + 30;
        let chain = SimChain::new(SimConfig {
            start_time: WEEK_SECONDS,
            consumed: BTreeMap::from([("0xa".to_string(), 25.0)]),
            ..SimConfig::default()
        });
        let due = [
            due(Target::new("0xa", 300).with_price(3.0), now),
            due(Target::new("0xb", 300), now),
        ];
        let mut c = consumer();
        let planned = c
            .plan(
                &chain,
                PlanInput {
                    now,
                    due: &due,
                    total_targets: 1,
                },
            )
            .await
            .unwrap();

        match &planned[0].plan {
            Plan::Act(a) => {
                // expected 40, consumed 25, price 3 -> 5 units
                assert_eq!(a.payload, Payload::Quantity { units: 5 });
                assert_eq!(a.epoch, 8);
                assert_eq!(a.slot, 8 * DAY_SECONDS);
            }
            other => panic!("expected purchase, got {other:?}"),
        }
        assert!(matches!(
            planned[1].plan,
            Plan::Skip(SkipReason::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn met_quota_buys_nothing() {
        let now = WEEK_SECONDS + 30;
        let chain = SimChain::new(SimConfig {
            start_time: WEEK_SECONDS,
            consumed: BTreeMap::from([("0xa".to_string(), 20.0)]),
            ..SimConfig::default()
        });
        let due = [due(Target::new("0xa", 300).with_price(1.0), now)];
        let planned = consumer()
            .plan(
                &chain,
                PlanInput {
                    now,
                    due: &due,
                    total_targets: 1,
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            planned[0].plan,
            Plan::Skip(SkipReason::NoPayload { .. })
        ));
    }

    #[test]
    fn sleeps_until_next_interval_or_backs_off() {
        let c = consumer();
        let clean = CycleReport::new("consumer", Block {
            number: 1,
            timestamp: 0,
        });
        let now = WEEK_SECONDS + 100;
        assert_eq!(c.next_wake(now, &clean), Some(WEEK_SECONDS + DAY_SECONDS + 60));
        assert_eq!(c.next_wake(now, &failed_report()), Some(now + 60));
    }

    #[test]
    fn batch_shrinks_after_repeated_failures() {
        let mut c = consumer();
        for _ in 0..3 {
            c.on_cycle(&failed_report());
        }
        assert_eq!(c.max_batch_size(20), 20);
        c.on_cycle(&failed_report());
        assert_eq!(c.max_batch_size(20), 13);
    }

    #[test]
    fn batch_never_shrinks_below_minimum() {
        let mut c = consumer();
        c.batch_size = 7;
        for _ in 0..4 {
            c.on_cycle(&failed_report());
        }
        assert_eq!(c.max_batch_size(20), 6);
        for _ in 0..4 {
            c.on_cycle(&failed_report());
        }
        assert_eq!(c.max_batch_size(20), 6);
    }

    #[test]
    fn clean_cycle_resets_failure_count() {
        let mut c = consumer();
        for _ in 0..3 {
            c.on_cycle(&failed_report());
        }
        c.on_cycle(&CycleReport::new("consumer", Block {
            number: 2,
            timestamp: 0,
        }));
        c.on_cycle(&failed_report());
        assert_eq!(c.max_batch_size(20), 20);
    }
}
