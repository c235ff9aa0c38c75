use thiserror::Error;

use crate::chain::ChainError;

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("config not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("seconds_per_epoch must be positive (target: {0})")]
    ZeroEpochLength(String),

    #[error("no targets matched the configured filter")]
    NoTargets,

    #[error("unknown target: {0}")]
    UnknownTarget(String),

    #[error("epoch store error: {0}")]
    Store(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SlotError>;
