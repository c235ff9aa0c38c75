//! Acted-epoch records in an embedded redb database.
//!
//! One table, `acted_epochs`, keyed by target address with the last acted
//! epoch as a `u64` value. Each `save` is its own committed write
//! transaction, so a record is durable once `save` returns.

use std::collections::BTreeMap;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{Result, SlotError};

use super::EpochStore;

const ACTED: TableDefinition<&str, u64> = TableDefinition::new("acted_epochs");

fn store_err(e: impl std::fmt::Display) -> SlotError {
    SlotError::Store(e.to_string())
}

pub struct RedbEpochStore {
    db: Database,
}

impl RedbEpochStore {
    /// Open or create the database at `path`, creating the table if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path).map_err(store_err)?;
        // Ensure the table exists before any reads
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(ACTED).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }
}

impl EpochStore for RedbEpochStore {
    fn load(&self, target: &str) -> Result<Option<u64>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACTED).map_err(store_err)?;
        let value = table.get(target).map_err(store_err)?;
        Ok(value.map(|v| v.value()))
    }

    fn load_all(&self) -> Result<BTreeMap<String, u64>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACTED).map_err(store_err)?;
        let mut out = BTreeMap::new();
        for entry in table.iter().map_err(store_err)? {
            let (k, v) = entry.map_err(store_err)?;
            out.insert(k.value().to_string(), v.value());
        }
        Ok(out)
    }

    fn save(&mut self, target: &str, epoch: u64) -> Result<()> {
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(ACTED).map_err(store_err)?;
            table.insert(target, epoch).map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    fn remove(&mut self, target: &str) -> Result<bool> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let existed = {
            let mut table = wt.open_table(ACTED).map_err(store_err)?;
            let removed = table.remove(target).map_err(store_err)?;
            removed.is_some()
        };
        wt.commit().map_err(store_err)?;
        Ok(existed)
    }
}
