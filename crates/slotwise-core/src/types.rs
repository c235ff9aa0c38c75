use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// One addressable on-chain feed contract the scheduler acts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub address: String,
    /// `0` means unknown; the scheduler asks the chain once and memoizes it.
    #[serde(default)]
    pub seconds_per_epoch: u64,
    /// Price of one consumption unit, in budget units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Trading pair label, e.g. `BTC/USDT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair: Option<String>,
}

impl Target {
    pub fn new(address: impl Into<String>, seconds_per_epoch: u64) -> Self {
        Self {
            address: address.into(),
            seconds_per_epoch,
            price: None,
            pair: None,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_pair(mut self, pair: impl Into<String>) -> Self {
        self.pair = Some(pair.into());
        self
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pair {
            Some(pair) => write!(f, "{pair}@{}", self.address),
            None => f.write_str(&self.address),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// What a pending action submits.
///
/// Only `Quantity` can be split across batches or halved on revert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Consumption units to purchase.
    Quantity { units: u64 },
    Prediction { predicted_up: bool, stake: f64 },
    Trueval { value: bool, cancel: bool },
    Trade { go_long: bool, confidence: f64, size: f64 },
}

impl Payload {
    /// Size counted against `max_batch_size`: the quantity, or 1 for a fixed payload.
    pub fn size(&self) -> u64 {
        match self {
            Self::Quantity { units } => *units,
            _ => 1,
        }
    }

    pub fn is_splittable(&self) -> bool {
        matches!(self, Self::Quantity { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Quantity { .. } => "quantity",
            Self::Prediction { .. } => "prediction",
            Self::Trueval { .. } => "trueval",
            Self::Trade { .. } => "trade",
        }
    }
}

// ---------------------------------------------------------------------------
// PendingAction
// ---------------------------------------------------------------------------

/// An action awaiting submission for one (target, epoch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub target: String,
    /// Epoch the acted-cache is keyed on.
    pub epoch: u64,
    /// Slot timestamp passed to the contract.
    pub slot: u64,
    pub payload: Payload,
}

impl PendingAction {
    pub fn new(target: impl Into<String>, epoch: u64, slot: u64, payload: Payload) -> Self {
        Self {
            target: target.into(),
            epoch,
            slot,
            payload,
        }
    }

    pub fn size(&self) -> u64 {
        self.payload.size()
    }

    /// Copy of this action carrying `units` instead of its own quantity.
    ///
    /// Fixed payloads are returned unchanged.
    pub fn with_units(&self, units: u64) -> Self {
        let payload = match self.payload {
            Payload::Quantity { .. } => Payload::Quantity { units },
            ref other => other.clone(),
        };
        Self {
            payload,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkipReason {
    /// The epoch's action window closed before an action was confirmed.
    MissedWindow,
    /// The executor produced nothing to submit (e.g. model declined).
    NoPayload { detail: String },
    /// The executor could not gather its inputs this cycle.
    Unavailable { detail: String },
    /// Planned but not submitted because shutdown was requested.
    Interrupted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissedWindow => f.write_str("missed window"),
            Self::NoPayload { detail } => write!(f, "no payload: {detail}"),
            Self::Unavailable { detail } => write!(f, "unavailable: {detail}"),
            Self::Interrupted => f.write_str("interrupted by shutdown"),
        }
    }
}

/// Terminal result of one submitted (or skipped) piece of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        tx_ref: String,
    },
    Reverted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tx_ref: Option<String>,
        reason: String,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn tx_ref(&self) -> Option<&str> {
        match self {
            Self::Success { tx_ref } => Some(tx_ref),
            Self::Reverted { tx_ref, .. } => tx_ref.as_deref(),
            Self::Skipped { .. } => None,
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "SUCCESS",
            Self::Reverted { .. } => "REVERTED",
            Self::Skipped { .. } => "SKIPPED",
        }
    }
}

/// Outcome of one action (or one split half of it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: PendingAction,
    pub outcome: Outcome,
}

impl ActionResult {
    pub fn new(action: PendingAction, outcome: Outcome) -> Self {
        Self { action, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_payloads_count_as_one() {
        let p = Payload::Trueval {
            value: true,
            cancel: false,
        };
        assert_eq!(p.size(), 1);
        assert!(!p.is_splittable());
        assert_eq!(Payload::Quantity { units: 12 }.size(), 12);
    }

    #[test]
    fn with_units_only_touches_quantities() {
        let a = PendingAction::new("0x1", 3, 900, Payload::Quantity { units: 10 });
        assert_eq!(a.with_units(4).size(), 4);

        let b = PendingAction::new(
            "0x2",
            3,
            900,
            Payload::Prediction {
                predicted_up: true,
                stake: 2.0,
            },
        );
        assert_eq!(b.with_units(4), b);
    }

    #[test]
    fn outcome_json_is_tagged() {
        let json = serde_json::to_string(&Outcome::skipped(SkipReason::MissedWindow)).unwrap();
        assert!(json.contains("missed_window"));
        assert!(json.contains("\"type\":\"skipped\""));
        let ok = serde_json::to_string(&Outcome::Success {
            tx_ref: "0xfeed".into(),
        })
        .unwrap();
        assert!(ok.contains("\"type\":\"success\""));
    }

    #[test]
    fn target_display_prefers_pair() {
        let t = Target::new("0xabc", 300).with_pair("ETH/USDT");
        assert_eq!(t.to_string(), "ETH/USDT@0xabc");
        assert_eq!(Target::new("0xabc", 300).to_string(), "0xabc");
    }
}
