//! Persisted "already acted" epochs.
//!
//! [`ActedEpochCache`] is the scheduler's view; the bytes live in an
//! injected [`EpochStore`]. Only the most recent epoch per target is kept,
//! since a target never moves backwards.

pub mod db;
pub mod file;

use std::collections::BTreeMap;

use crate::error::Result;

pub use db::RedbEpochStore;
pub use file::FileEpochStore;

// ---------------------------------------------------------------------------
// EpochStore
// ---------------------------------------------------------------------------

/// Keyed persistence for the last acted epoch per target.
///
/// `save` must be durable when it returns `Ok`.
pub trait EpochStore: Send {
    fn load(&self, target: &str) -> Result<Option<u64>>;
    fn load_all(&self) -> Result<BTreeMap<String, u64>>;
    fn save(&mut self, target: &str, epoch: u64) -> Result<()>;
    /// Returns `true` if a record existed.
    fn remove(&mut self, target: &str) -> Result<bool>;
}

impl<S: EpochStore + ?Sized> EpochStore for Box<S> {
    fn load(&self, target: &str) -> Result<Option<u64>> {
        (**self).load(target)
    }

    fn load_all(&self) -> Result<BTreeMap<String, u64>> {
        (**self).load_all()
    }

    fn save(&mut self, target: &str, epoch: u64) -> Result<()> {
        (**self).save(target, epoch)
    }

    fn remove(&mut self, target: &str) -> Result<bool> {
        (**self).remove(target)
    }
}

/// Non-durable store for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryEpochStore {
    records: BTreeMap<String, u64>,
}

impl MemoryEpochStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EpochStore for MemoryEpochStore {
    fn load(&self, target: &str) -> Result<Option<u64>> {
        Ok(self.records.get(target).copied())
    }

    fn load_all(&self) -> Result<BTreeMap<String, u64>> {
        Ok(self.records.clone())
    }

    fn save(&mut self, target: &str, epoch: u64) -> Result<()> {
        self.records.insert(target.to_string(), epoch);
        Ok(())
    }

    fn remove(&mut self, target: &str) -> Result<bool> {
        Ok(self.records.remove(target).is_some())
    }
}

// ---------------------------------------------------------------------------
// ActedEpochCache
// ---------------------------------------------------------------------------

/// In-memory mirror of an [`EpochStore`], written through on every record.
pub struct ActedEpochCache<S> {
    store: S,
    last: BTreeMap<String, u64>,
}

impl<S: EpochStore> ActedEpochCache<S> {
    /// Load every record from `store`. Targets without a record have never acted.
    pub fn open(store: S) -> Result<Self> {
        let last = store.load_all()?;
        tracing::debug!(records = last.len(), "acted-epoch cache loaded");
        Ok(Self { store, last })
    }

    /// True when `epoch` is at or before the last recorded epoch for `target`.
    pub fn has_acted(&self, target: &str, epoch: u64) -> bool {
        self.last.get(target).is_some_and(|&last| epoch <= last)
    }

    pub fn last_acted(&self, target: &str) -> Option<u64> {
        self.last.get(target).copied()
    }

    /// Persist `epoch` for `target`, then update the in-memory view.
    ///
    /// On a store error the view is unchanged and the error is returned.
    /// Recording an epoch at or before the current record is a no-op.
    pub fn record(&mut self, target: &str, epoch: u64) -> Result<()> {
        if self.has_acted(target, epoch) {
            return Ok(());
        }
        self.store.save(target, epoch)?;
        self.last.insert(target.to_string(), epoch);
        Ok(())
    }

    pub fn snapshot(&self) -> &BTreeMap<String, u64> {
        &self.last
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
