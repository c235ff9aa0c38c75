//! Epoch arithmetic over chain timestamps.
//!
//! All functions are pure. Timestamps are unix seconds as reported by the
//! latest observed block, never the local wall clock.

use serde::Serialize;

/// Epoch index containing `now_ts`: `floor(now_ts / seconds_per_epoch)`.
///
/// `seconds_per_epoch` must be positive; callers validate it when a target
/// is loaded (see [`EpochPosition::at`]).
pub fn current_epoch(now_ts: u64, seconds_per_epoch: u64) -> u64 {
    now_ts / seconds_per_epoch
}

/// Seconds until the epoch containing `now_ts` ends.
///
/// A timestamp exactly on a boundary is the first second of a new epoch,
/// so the result is `seconds_per_epoch`, never `0`.
pub fn seconds_left_in_epoch(now_ts: u64, seconds_per_epoch: u64) -> u64 {
    (current_epoch(now_ts, seconds_per_epoch) + 1) * seconds_per_epoch - now_ts
}

/// Canonical timestamp naming `epoch` for a target.
pub fn slot_of(epoch: u64, seconds_per_epoch: u64) -> u64 {
    epoch * seconds_per_epoch
}

/// Where a timestamp falls inside a target's epoch grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EpochPosition {
    pub epoch: u64,
    /// Start of `epoch`.
    pub slot: u64,
    pub seconds_per_epoch: u64,
    pub seconds_left: u64,
    pub seconds_elapsed: u64,
}

impl EpochPosition {
    /// Returns `None` when `seconds_per_epoch` is zero.
    pub fn at(now_ts: u64, seconds_per_epoch: u64) -> Option<Self> {
        if seconds_per_epoch == 0 {
            return None;
        }
        let epoch = current_epoch(now_ts, seconds_per_epoch);
        let slot = slot_of(epoch, seconds_per_epoch);
        Some(Self {
            epoch,
            slot,
            seconds_per_epoch,
            seconds_left: seconds_left_in_epoch(now_ts, seconds_per_epoch),
            seconds_elapsed: now_ts - slot,
        })
    }

    /// Start of the next epoch.
    pub fn next_slot(&self) -> u64 {
        self.slot + self.seconds_per_epoch
    }

    /// Same position with a different epoch index, used when the chain's
    /// own epoch counter disagrees with local arithmetic.
    pub fn with_epoch(self, epoch: u64) -> Self {
        Self {
            epoch,
            slot: slot_of(epoch, self.seconds_per_epoch),
            ..self
        }
    }
}
