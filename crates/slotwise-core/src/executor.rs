//! The per-flavour seam of the scheduler.
//!
//! The scheduler decides *when* a target is due; an [`ActionExecutor`]
//! decides *what* to submit for it. Implementations live in
//! [`crate::agents`].

use serde::{Deserialize, Serialize};

use crate::chain::ChainClient;
use crate::clock::EpochPosition;
use crate::error::Result;
use crate::gate::ActionWindow;
use crate::report::CycleReport;
use crate::types::{PendingAction, SkipReason, Target};

/// How planned actions reach the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One transaction per action.
    Single,
    /// Packed into bounded batches and submitted through the fallback cascade.
    Batched,
}

/// A target the gate found due this poll.
#[derive(Debug, Clone, PartialEq)]
pub struct DueTarget {
    pub target: Target,
    /// The epoch the action is for; not always the current one.
    pub epoch: u64,
    /// Where the poll's chain time falls in the target's epoch grid.
    pub position: EpochPosition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Act(PendingAction),
    Skip(SkipReason),
}

/// The executor's answer for one due target.
#[derive(Debug, Clone, PartialEq)]
pub struct Planned {
    pub target: String,
    pub epoch: u64,
    pub plan: Plan,
}

impl Planned {
    pub fn act(action: PendingAction) -> Self {
        Self {
            target: action.target.clone(),
            epoch: action.epoch,
            plan: Plan::Act(action),
        }
    }

    pub fn skip(due: &DueTarget, reason: SkipReason) -> Self {
        Self {
            target: due.target.address.clone(),
            epoch: due.epoch,
            plan: Plan::Skip(reason),
        }
    }
}

pub struct PlanInput<'a> {
    /// Chain time of the block being processed.
    pub now: u64,
    pub due: &'a [DueTarget],
    /// Every target the agent works on, due or not.
    pub total_targets: usize,
}

#[async_trait::async_trait]
pub trait ActionExecutor: Send {
    fn name(&self) -> &'static str;

    fn mode(&self) -> ExecutionMode;

    fn window(&self) -> ActionWindow;

    /// Length of the epoch grid the gate uses for `target`.
    fn cadence(&self, target: &Target) -> u64 {
        target.seconds_per_epoch
    }

    /// Build at most one action (or a skip) per due target.
    ///
    /// Failures specific to one target come back as
    /// [`SkipReason::Unavailable`]; an `Err` abandons the whole poll.
    async fn plan(&mut self, chain: &dyn ChainClient, input: PlanInput<'_>) -> Result<Vec<Planned>>;

    /// Called once per processed poll with its report.
    fn on_cycle(&mut self, _report: &CycleReport) {}

    /// Chain timestamp worth waking up for after `report`, if any.
    fn next_wake(&self, _now: u64, _report: &CycleReport) -> Option<u64> {
        None
    }

    /// Whether a failed epoch whose window closed is reported as a
    /// `MissedWindow` skip. Executors that make up shortfalls later turn it off.
    fn reports_missed_windows(&self) -> bool {
        true
    }

    /// Batch size to pack with, given the configured one.
    fn max_batch_size(&self, configured: u64) -> u64 {
        configured
    }
}
