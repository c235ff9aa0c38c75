//! Per-target decision: is an action due right now?
//!
//! Each target moves through `Idle → Due → Acting → Idle` once per poll.
//! The gate never submits anything itself; the scheduler calls
//! [`ActionGate::begin`] when it starts building an action and
//! [`ActionGate::resolve`] when the action reached a terminal state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::clock::EpochPosition;
use crate::store::{ActedEpochCache, EpochStore};

// ---------------------------------------------------------------------------
// ActionWindow
// ---------------------------------------------------------------------------

/// When, inside an epoch, an action may be taken and for which epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionWindow {
    /// Act in the last `seconds` of the current epoch.
    Closing { seconds: u64 },
    /// Act while at least `min_seconds_left` remain in the current epoch.
    Opening { min_seconds_left: u64 },
    /// Act for the previous epoch once it has fully elapsed.
    Elapsed,
    /// Act once per epoch, at the first poll that sees it.
    Always,
}

impl ActionWindow {
    /// Epoch an action taken at `pos` would be for.
    pub fn target_epoch(&self, pos: &EpochPosition) -> Option<u64> {
        match self {
            Self::Elapsed => pos.epoch.checked_sub(1),
            _ => Some(pos.epoch),
        }
    }

    pub fn is_open(&self, pos: &EpochPosition) -> bool {
        match *self {
            Self::Closing { seconds } => pos.seconds_left <= seconds,
            Self::Opening { min_seconds_left } => pos.seconds_left >= min_seconds_left,
            Self::Elapsed | Self::Always => true,
        }
    }

    /// Whether `epoch` can still be acted on at `pos`.
    pub fn is_actionable(&self, epoch: u64, pos: &EpochPosition) -> bool {
        self.target_epoch(pos) == Some(epoch) && self.is_open(pos)
    }
}

// ---------------------------------------------------------------------------
// GateState / GateDecision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    Idle,
    Due { epoch: u64 },
    Acting { epoch: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Build and submit an action for `epoch`.
    Due { epoch: u64 },
    /// Window not open yet (or already closed) for this epoch.
    Wait { seconds_left: u64 },
    AlreadyActed { epoch: u64 },
    /// An action for `epoch` is still being resolved.
    InFlight { epoch: u64 },
}

/// How an action left the `Acting` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Confirmed on chain; the caller records it in the cache.
    Succeeded,
    /// Reverted or exhausted retries; retried at the next poll while the window is open.
    Failed,
    /// The executor chose not to act; retried at the next poll, never reported as missed.
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: GateDecision,
    /// A previously failed epoch whose window has now closed.
    pub missed: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct TargetGate {
    state: GateState,
    failed_epoch: Option<u64>,
    /// Last epoch whose executor skip has been reported.
    declined_epoch: Option<u64>,
}

impl Default for TargetGate {
    fn default() -> Self {
        Self {
            state: GateState::Idle,
            failed_epoch: None,
            declined_epoch: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ActionGate
// ---------------------------------------------------------------------------

pub struct ActionGate {
    window: ActionWindow,
    targets: HashMap<String, TargetGate>,
}

impl ActionGate {
    pub fn new(window: ActionWindow) -> Self {
        Self {
            window,
            targets: HashMap::new(),
        }
    }

    pub fn window(&self) -> ActionWindow {
        self.window
    }

    pub fn state(&self, target: &str) -> GateState {
        self.targets
            .get(target)
            .map(|g| g.state)
            .unwrap_or(GateState::Idle)
    }

    /// Decide whether `target` is due at `pos`.
    ///
    /// Moves `Idle → Due` when the window is open and the target epoch has
    /// not been acted on. Also reports (once) a failed epoch whose window has
    /// since closed.
    pub fn evaluate<S: EpochStore>(
        &mut self,
        target: &str,
        pos: &EpochPosition,
        cache: &ActedEpochCache<S>,
    ) -> Evaluation {
        let window = self.window;
        let gate = self.targets.entry(target.to_string()).or_default();

        let mut missed = None;
        if let Some(failed) = gate.failed_epoch {
            if cache.has_acted(target, failed) {
                gate.failed_epoch = None;
            } else if !window.is_actionable(failed, pos) {
                gate.failed_epoch = None;
                missed = Some(failed);
            }
        }

        if let GateState::Acting { epoch } = gate.state {
            return Evaluation {
                decision: GateDecision::InFlight { epoch },
                missed,
            };
        }

        let decision = match window.target_epoch(pos) {
            None => GateDecision::Wait {
                seconds_left: pos.seconds_left,
            },
            Some(epoch) if cache.has_acted(target, epoch) => {
                gate.state = GateState::Idle;
                GateDecision::AlreadyActed { epoch }
            }
            Some(epoch) if window.is_open(pos) => {
                gate.state = GateState::Due { epoch };
                GateDecision::Due { epoch }
            }
            Some(_) => {
                gate.state = GateState::Idle;
                GateDecision::Wait {
                    seconds_left: pos.seconds_left,
                }
            }
        };
        Evaluation { decision, missed }
    }

    /// `Due → Acting`. Returns `false` if the target was not due for `epoch`.
    pub fn begin(&mut self, target: &str, epoch: u64) -> bool {
        match self.targets.get_mut(target) {
            Some(g) if g.state == (GateState::Due { epoch }) => {
                g.state = GateState::Acting { epoch };
                true
            }
            _ => false,
        }
    }

    /// `Acting → Idle`.
    pub fn resolve(&mut self, target: &str, epoch: u64, resolution: Resolution) {
        let gate = self.targets.entry(target.to_string()).or_default();
        gate.state = GateState::Idle;
        match resolution {
            Resolution::Succeeded => {
                if gate.failed_epoch.is_some_and(|e| e <= epoch) {
                    gate.failed_epoch = None;
                }
            }
            Resolution::Failed => gate.failed_epoch = Some(epoch),
            Resolution::Declined => {}
        }
    }

    /// Note that the executor declined `epoch` for `target`. Returns `true`
    /// only the first time per epoch, so a skip that is retried every poll
    /// is reported once.
    pub fn first_decline(&mut self, target: &str, epoch: u64) -> bool {
        let gate = self.targets.entry(target.to_string()).or_default();
        if gate.declined_epoch == Some(epoch) {
            return false;
        }
        gate.declined_epoch = Some(epoch);
        true
    }

    /// Return every `Due` target to `Idle` without touching failure tracking.
    pub fn reset_due(&mut self) {
        for g in self.targets.values_mut() {
            if matches!(g.state, GateState::Due { .. }) {
                g.state = GateState::Idle;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
