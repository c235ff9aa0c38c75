//! The four agent flavours, each an [`ActionExecutor`].

pub mod consumer;
pub mod predictor;
pub mod trader;
pub mod trueval;

pub use consumer::{Consumer, ConsumerSettings};
pub use predictor::{ModelCall, PredictionModel, Predictor, StaticModel};
pub use trader::{Signal, SignalSource, StaticSignal, Trader, TraderSettings};
pub use trueval::{PriceTable, TruevalSource, TruevalSubmitter};

use crate::config::{AgentKind, Config};
use crate::error::Result;
use crate::executor::ActionExecutor;

/// Build the executor `config.agent` names, with its built-in data sources.
pub fn build(config: &Config) -> Result<Box<dyn ActionExecutor>> {
    let window = config.schedule.action_window_seconds;
    Ok(match config.agent {
        AgentKind::Predictor => Box::new(Predictor::new(
            StaticModel {
                call: ModelCall {
                    predicted_up: config.predictor.predict_up,
                    stake: config.predictor.stake,
                },
            },
            window,
        )),
        AgentKind::Trader => Box::new(Trader::new(
            StaticSignal(Signal {
                go_long: config.trader.signal_long,
                confidence: config.trader.signal_confidence,
            }),
            TraderSettings {
                min_seconds_left: window,
                min_confidence: config.trader.min_confidence,
                position_size: config.trader.position_size,
            },
        )),
        AgentKind::Trueval => Box::new(TruevalSubmitter::new(PriceTable::new(
            config.trueval.prices.clone(),
        ))),
        AgentKind::Consumer => Box::new(Consumer::new(
            config.quota.calculator()?,
            ConsumerSettings {
                weekly_budget: config.quota.weekly_budget,
                grace_seconds: config.quota.grace_seconds,
                failure_backoff_seconds: config.quota.failure_backoff_seconds,
                shrink_after_failures: config.quota.shrink_after_failures,
                min_batch_size: config.quota.min_batch_size,
                max_batch_size: config.batch.max_batch_size,
            },
        )),
    })
}
