use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::io::{atomic_write, read_if_exists};

use super::EpochStore;

/// YAML map `target: epoch` on disk.
///
/// Every `save` rewrites the whole file through [`atomic_write`]; a crash
/// mid-write leaves the previous file intact.
#[derive(Debug, Clone)]
pub struct FileEpochStore {
    path: PathBuf,
}

impl FileEpochStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, u64>> {
        match read_if_exists(&self.path)? {
            Some(data) if !data.trim().is_empty() => Ok(serde_yaml::from_str(&data)?),
            _ => Ok(BTreeMap::new()),
        }
    }

    fn write(&self, records: &BTreeMap<String, u64>) -> Result<()> {
        let data = serde_yaml::to_string(records)?;
        atomic_write(&self.path, data.as_bytes())
    }
}

impl EpochStore for FileEpochStore {
    fn load(&self, target: &str) -> Result<Option<u64>> {
        Ok(self.read()?.get(target).copied())
    }

    fn load_all(&self) -> Result<BTreeMap<String, u64>> {
        self.read()
    }

    fn save(&mut self, target: &str, epoch: u64) -> Result<()> {
        let mut records = self.read()?;
        records.insert(target.to_string(), epoch);
        self.write(&records)
    }

    fn remove(&mut self, target: &str) -> Result<bool> {
        let mut records = self.read()?;
        let existed = records.remove(target).is_some();
        if existed {
            self.write(&records)?;
        }
        Ok(existed)
    }
}
