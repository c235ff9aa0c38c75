//! Greedy, order-preserving packing of pending actions into batches.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::PendingAction;

pub type Batch = Vec<PendingAction>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLimits {
    /// Upper bound on the summed action sizes in one batch.
    pub max_batch_size: u64,
    /// Upper bound on distinct targets in one batch.
    pub max_targets_per_batch: usize,
}

impl BatchLimits {
    pub fn new(max_batch_size: u64, max_targets_per_batch: usize) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            max_targets_per_batch: max_targets_per_batch.max(1),
        }
    }
}

struct Open {
    actions: Batch,
    size: u64,
    targets: BTreeSet<String>,
}

impl Open {
    fn new() -> Self {
        Self {
            actions: Vec::new(),
            size: 0,
            targets: BTreeSet::new(),
        }
    }

    fn room(&self, limits: &BatchLimits) -> u64 {
        limits.max_batch_size.saturating_sub(self.size)
    }

    fn admits_target(&self, target: &str, limits: &BatchLimits) -> bool {
        self.targets.contains(target) || self.targets.len() < limits.max_targets_per_batch
    }

    fn push(&mut self, action: PendingAction) {
        self.size += action.size();
        self.targets.insert(action.target.clone());
        self.actions.push(action);
    }

    fn close(&mut self, out: &mut Vec<Batch>) {
        if !self.actions.is_empty() {
            out.push(std::mem::take(&mut self.actions));
        }
        self.size = 0;
        self.targets.clear();
    }
}

/// Pack `actions` in input order.
///
/// A batch closes when the next action would exceed either limit. Quantity
/// actions that overflow are split, the remainder opening the next batch;
/// fixed payloads move whole. Zero-size actions are dropped.
pub fn pack(actions: &[PendingAction], limits: BatchLimits) -> Vec<Batch> {
    let limits = BatchLimits::new(limits.max_batch_size, limits.max_targets_per_batch);
    let mut out = Vec::new();
    let mut open = Open::new();

    for action in actions {
        let size = action.size();
        if size == 0 {
            continue;
        }

        if !action.payload.is_splittable() {
            if open.room(&limits) < size || !open.admits_target(&action.target, &limits) {
                open.close(&mut out);
            }
            open.push(action.clone());
            continue;
        }

        let mut remaining = size;
        while remaining > 0 {
            let room = open.room(&limits);
            if room == 0 || !open.admits_target(&action.target, &limits) {
                open.close(&mut out);
                continue;
            }
            let take = room.min(remaining);
            open.push(action.with_units(take));
            remaining -= take;
        }
    }
    open.close(&mut out);

    tracing::debug!(
        actions = actions.len(),
        batches = out.len(),
        max_batch_size = limits.max_batch_size,
        max_targets = limits.max_targets_per_batch,
        "packed actions"
    );
    out
}
