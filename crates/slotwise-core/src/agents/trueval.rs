//! Trueval submitter: settles each epoch once it has fully elapsed.
//!
//! For epoch `E` the value is whether the price rose between `E * spe` and
//! `(E + 1) * spe`. When no value can be computed the round is cancelled
//! instead, so stakers are refunded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chain::ChainClient;
use crate::clock::slot_of;
use crate::error::Result;
use crate::executor::{ActionExecutor, ExecutionMode, PlanInput, Planned};
use crate::gate::ActionWindow;
use crate::types::{Payload, PendingAction, SkipReason, Target};

#[async_trait::async_trait]
pub trait TruevalSource: Send + Sync {
    /// `Some(true)` if the feed went up over `[init_ts, end_ts]`; `None`
    /// when the data to decide is missing.
    async fn trueval(&self, target: &Target, init_ts: u64, end_ts: u64) -> Result<Option<bool>>;
}

/// Price points per target address, keyed by timestamp.
///
/// The price at `ts` is the last point at or before `ts`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable {
    series: BTreeMap<String, BTreeMap<u64, f64>>,
}

impl PriceTable {
    pub fn new(series: BTreeMap<String, BTreeMap<u64, f64>>) -> Self {
        Self { series }
    }

    pub fn price_at(&self, address: &str, ts: u64) -> Option<f64> {
        self.series
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(address))
            .and_then(|(_, points)| points.range(..=ts).next_back())
            .map(|(_, &p)| p)
    }
}

#[async_trait::async_trait]
impl TruevalSource for PriceTable {
    async fn trueval(&self, target: &Target, init_ts: u64, end_ts: u64) -> Result<Option<bool>> {
        let init = self.price_at(&target.address, init_ts);
        let end = self.price_at(&target.address, end_ts);
        Ok(match (init, end) {
            (Some(a), Some(b)) => Some(b > a),
            _ => None,
        })
    }
}

pub struct TruevalSubmitter<S> {
    source: S,
}

impl<S: TruevalSource> TruevalSubmitter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait::async_trait]
impl<S: TruevalSource> ActionExecutor for TruevalSubmitter<S> {
    fn name(&self) -> &'static str {
        "trueval"
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Batched
    }

    fn window(&self) -> ActionWindow {
        ActionWindow::Elapsed
    }

    async fn plan(&mut self, _chain: &dyn ChainClient, input: PlanInput<'_>) -> Result<Vec<Planned>> {
        let mut out = Vec::with_capacity(input.due.len());
        for due in input.due {
            let spe = due.target.seconds_per_epoch;
            let init_ts = slot_of(due.epoch, spe);
            let end_ts = slot_of(due.epoch + 1, spe);
            let payload = match self.source.trueval(&due.target, init_ts, end_ts).await {
                Ok(Some(value)) => Payload::Trueval {
                    value,
                    cancel: false,
                },
                Ok(None) => {
                    tracing::warn!(
                        addr = %due.target.address,
                        epoch = due.epoch,
                        "no trueval, cancelling round"
                    );
                    Payload::Trueval {
                        value: false,
                        cancel: true,
                    }
                }
                Err(e) => {
                    out.push(Planned::skip(due, SkipReason::Unavailable {
                        detail: e.to_string(),
                    }));
                    continue;
                }
            };
            out.push(Planned::act(PendingAction::new(
                due.target.address.clone(),
                due.epoch,
                init_ts,
                payload,
            )));
        }
        Ok(out)
    }
}
