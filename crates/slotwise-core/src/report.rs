//! Per-cycle outcome summary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::chain::Block;
use crate::types::{ActionResult, Outcome, SkipReason};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub target: String,
    pub epoch: u64,
    pub size: u64,
    pub outcome: Outcome,
}

impl ReportEntry {
    pub fn tx_ref(&self) -> Option<&str> {
        self.outcome.tx_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetTally {
    pub succeeded: usize,
    pub reverted: usize,
    pub skipped: usize,
    /// Summed size of successful pieces.
    pub confirmed_size: u64,
}

/// Everything that happened in one processed poll.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub id: Uuid,
    pub agent: String,
    pub block: Block,
    pub started_at: DateTime<Utc>,
    pub entries: Vec<ReportEntry>,
}

impl CycleReport {
    pub fn new(agent: impl Into<String>, block: Block) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent: agent.into(),
            block,
            started_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, result: ActionResult) {
        self.entries.push(ReportEntry {
            size: result.action.size(),
            target: result.action.target,
            epoch: result.action.epoch,
            outcome: result.outcome,
        });
    }

    pub fn push_skip(&mut self, target: &str, epoch: u64, reason: SkipReason) {
        self.entries.push(ReportEntry {
            target: target.to_string(),
            epoch,
            size: 0,
            outcome: Outcome::skipped(reason),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn successes(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Reverted { .. }))
            .count()
    }

    /// No reverts and no missed windows.
    pub fn is_clean(&self) -> bool {
        self.entries.iter().all(|e| match &e.outcome {
            Outcome::Reverted { .. } => false,
            Outcome::Skipped { reason } => *reason != SkipReason::MissedWindow,
            Outcome::Success { .. } => true,
        })
    }

    pub fn tallies(&self) -> BTreeMap<String, TargetTally> {
        let mut out: BTreeMap<String, TargetTally> = BTreeMap::new();
        for e in &self.entries {
            let t = out.entry(e.target.clone()).or_default();
            match e.outcome {
                Outcome::Success { .. } => {
                    t.succeeded += 1;
                    t.confirmed_size += e.size;
                }
                Outcome::Reverted { .. } => t.reverted += 1,
                Outcome::Skipped { .. } => t.skipped += 1,
            }
        }
        out
    }

    /// One log line per entry, then a summary line.
    pub fn log(&self) {
        for e in &self.entries {
            match &e.outcome {
                Outcome::Success { tx_ref } => tracing::info!(
                    addr = %e.target,
                    epoch = e.epoch,
                    size = e.size,
                    tx = %tx_ref,
                    "SUCCESS"
                ),
                Outcome::Reverted { tx_ref, reason } => tracing::warn!(
                    addr = %e.target,
                    epoch = e.epoch,
                    size = e.size,
                    tx = tx_ref.as_deref().unwrap_or("-"),
                    reason = %reason,
                    "REVERTED"
                ),
                Outcome::Skipped { reason } => tracing::info!(
                    addr = %e.target,
                    epoch = e.epoch,
                    reason = %reason,
                    "SKIPPED"
                ),
            }
        }
        tracing::info!(
            cycle = %self.id,
            agent = %self.agent,
            block = self.block.number,
            succeeded = self.successes(),
            failed = self.failures(),
            entries = self.entries.len(),
            "cycle complete"
        );
    }
}
