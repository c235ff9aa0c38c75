use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::BatchLimits;
use crate::chain::TargetFilter;
use crate::error::{Result, SlotError};
use crate::io::{atomic_write, read_if_exists};
use crate::quota::{QuotaCalculator, DAY_SECONDS, WEEK_SECONDS};
use crate::sim::SimConfig;
use crate::store::{EpochStore, FileEpochStore, RedbEpochStore};
use crate::submit::SubmitPolicy;

pub const CONFIG_FILE: &str = "slotwise.yaml";
pub const STATE_DIR: &str = ".slotwise";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AgentKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    #[default]
    Predictor,
    Trader,
    Trueval,
    Consumer,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Predictor => "predictor",
            Self::Trader => "trader",
            Self::Trueval => "trueval",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ScheduleConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Closing window for the predictor, opening margin for the trader.
    #[serde(default = "default_action_window")]
    pub action_window_seconds: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Upper bound on any single sleep of the poll loop.
    #[serde(default = "default_max_idle_sleep")]
    pub max_idle_sleep_seconds: u64,
    /// Cross-check local epoch arithmetic against the contract's counter.
    #[serde(default)]
    pub verify_epoch_on_chain: bool,
}

fn default_action_window() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    1
}

fn default_max_idle_sleep() -> u64 {
    300
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            action_window_seconds: default_action_window(),
            poll_interval_seconds: default_poll_interval(),
            max_idle_sleep_seconds: default_max_idle_sleep(),
            verify_epoch_on_chain: false,
        }
    }
}

// ---------------------------------------------------------------------------
// BatchConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: u64,
    #[serde(default = "default_max_targets")]
    pub max_targets_per_batch: usize,
}

fn default_max_batch_size() -> u64 {
    20
}

fn default_max_targets() -> usize {
    20
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_targets_per_batch: default_max_targets(),
        }
    }
}

impl BatchConfig {
    pub fn limits(&self) -> BatchLimits {
        BatchLimits::new(self.max_batch_size, self.max_targets_per_batch)
    }
}

// ---------------------------------------------------------------------------
// SubmitConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitConfig {
    #[serde(default = "default_max_retries")]
    pub max_submit_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_split_depth")]
    pub max_split_depth: u32,
    #[serde(default = "default_wait_for_receipt")]
    pub wait_for_receipt: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2_000
}

fn default_max_split_depth() -> u32 {
    1
}

fn default_wait_for_receipt() -> bool {
    true
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_submit_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_split_depth: default_max_split_depth(),
            wait_for_receipt: default_wait_for_receipt(),
        }
    }
}

impl SubmitConfig {
    pub fn policy(&self) -> SubmitPolicy {
        SubmitPolicy {
            max_submit_retries: self.max_submit_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_split_depth: self.max_split_depth,
            wait_for_receipt: self.wait_for_receipt,
        }
    }
}

// ---------------------------------------------------------------------------
// QuotaConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    /// Budget units to consume per week, shared across targets.
    #[serde(default)]
    pub weekly_budget: f64,
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_week")]
    pub week_seconds: u64,
    #[serde(default = "default_grace")]
    pub grace_seconds: u64,
    #[serde(default = "default_failure_backoff")]
    pub failure_backoff_seconds: u64,
    #[serde(default = "default_shrink_after")]
    pub shrink_after_failures: u32,
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: u64,
}

fn default_interval() -> u64 {
    DAY_SECONDS
}

fn default_week() -> u64 {
    WEEK_SECONDS
}

fn default_grace() -> u64 {
    60
}

fn default_failure_backoff() -> u64 {
    60
}

fn default_shrink_after() -> u32 {
    3
}

fn default_min_batch_size() -> u64 {
    6
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            weekly_budget: 0.0,
            interval_seconds: default_interval(),
            week_seconds: default_week(),
            grace_seconds: default_grace(),
            failure_backoff_seconds: default_failure_backoff(),
            shrink_after_failures: default_shrink_after(),
            min_batch_size: default_min_batch_size(),
        }
    }
}

impl QuotaConfig {
    pub fn calculator(&self) -> Result<QuotaCalculator> {
        QuotaCalculator::new(self.week_seconds, self.interval_seconds)
    }
}

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    #[default]
    File,
    Redb,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Relative paths resolve against the directory holding the config.
    /// Defaults to `.slotwise/acted-<agent>.{yaml,redb}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl CacheConfig {
    pub fn resolve_path(&self, root: &Path, agent: AgentKind) -> PathBuf {
        match &self.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => root.join(p),
            None => {
                let ext = match self.backend {
                    CacheBackend::File => "yaml",
                    CacheBackend::Redb => "redb",
                };
                root.join(STATE_DIR).join(format!("acted-{agent}.{ext}"))
            }
        }
    }

    pub fn open(&self, root: &Path, agent: AgentKind) -> Result<Box<dyn EpochStore>> {
        let path = self.resolve_path(root, agent);
        tracing::debug!(path = %path.display(), backend = ?self.backend, "opening epoch store");
        Ok(match self.backend {
            CacheBackend::File => Box::new(FileEpochStore::new(path)),
            CacheBackend::Redb => Box::new(RedbEpochStore::open(&path)?),
        })
    }
}

// ---------------------------------------------------------------------------
// ChainConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainBackend {
    #[default]
    Sim,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    #[serde(default)]
    pub backend: ChainBackend,
    #[serde(default)]
    pub sim: SimConfig,
}

// ---------------------------------------------------------------------------
// Flavour sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictorConfig {
    #[serde(default = "default_stake")]
    pub stake: f64,
    #[serde(default = "default_true")]
    pub predict_up: bool,
}

fn default_stake() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            stake: default_stake(),
            predict_up: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraderConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_position_size")]
    pub position_size: f64,
    /// Fixed aggregate used when no live signal source is wired in.
    #[serde(default = "default_true")]
    pub signal_long: bool,
    #[serde(default = "default_signal_confidence")]
    pub signal_confidence: f64,
}

fn default_min_confidence() -> f64 {
    0.55
}

fn default_position_size() -> f64 {
    1.0
}

fn default_signal_confidence() -> f64 {
    0.6
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            position_size: default_position_size(),
            signal_long: true,
            signal_confidence: default_signal_confidence(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TruevalConfig {
    /// `address -> { timestamp: price }`.
    #[serde(default)]
    pub prices: BTreeMap<String, BTreeMap<u64, f64>>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentKind,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub submit: SubmitConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub filter: TargetFilter,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub trader: TraderConfig,
    #[serde(default)]
    pub trueval: TruevalConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = read_if_exists(path)?
            .ok_or_else(|| SlotError::ConfigNotFound(path.display().to_string()))?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        atomic_write(path, data.as_bytes())
    }

    /// Walk up from `start` looking for [`CONFIG_FILE`].
    pub fn discover(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Validate the config, returning all problems found.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.batch.max_batch_size == 0 {
            warnings.push(ConfigWarning::error("batch.max_batch_size must be positive"));
        }
        if self.batch.max_targets_per_batch == 0 {
            warnings.push(ConfigWarning::error(
                "batch.max_targets_per_batch must be positive",
            ));
        }

        if self.quota.interval_seconds == 0 || self.quota.week_seconds == 0 {
            warnings.push(ConfigWarning::error(
                "quota.interval_seconds and quota.week_seconds must be positive",
            ));
        } else if self.quota.interval_seconds > self.quota.week_seconds {
            warnings.push(ConfigWarning::error(format!(
                "quota.interval_seconds ({}) is longer than quota.week_seconds ({})",
                self.quota.interval_seconds, self.quota.week_seconds
            )));
        } else if self.quota.week_seconds % self.quota.interval_seconds != 0 {
            warnings.push(ConfigWarning::warning(format!(
                "quota.interval_seconds ({}) does not divide the week; the last interval is short",
                self.quota.interval_seconds
            )));
        }

        if self.submit.max_submit_retries > 10 {
            warnings.push(ConfigWarning::warning(format!(
                "submit.max_submit_retries={} (>10 is unusual)",
                self.submit.max_submit_retries
            )));
        }
        if self.submit.max_split_depth > 4 {
            warnings.push(ConfigWarning::warning(format!(
                "submit.max_split_depth={} can fan one action out into {} transactions",
                self.submit.max_split_depth,
                1u64 << self.submit.max_split_depth.min(63)
            )));
        }

        if self.quota.min_batch_size > self.batch.max_batch_size {
            warnings.push(ConfigWarning::warning(format!(
                "quota.min_batch_size ({}) exceeds batch.max_batch_size ({})",
                self.quota.min_batch_size, self.batch.max_batch_size
            )));
        }

        match self.agent {
            AgentKind::Consumer => {
                if self.quota.weekly_budget <= 0.0 {
                    warnings.push(ConfigWarning::error(
                        "quota.weekly_budget must be positive for the consumer agent",
                    ));
                }
            }
            AgentKind::Predictor => {
                if self.predictor.stake <= 0.0 {
                    warnings.push(ConfigWarning::warning(
                        "predictor.stake is zero; every epoch will be skipped",
                    ));
                }
            }
            AgentKind::Trader => {
                if !(0.0..=1.0).contains(&self.trader.min_confidence) {
                    warnings.push(ConfigWarning::error(format!(
                        "trader.min_confidence={} is outside [0, 1]",
                        self.trader.min_confidence
                    )));
                }
            }
            AgentKind::Trueval => {}
        }

        let window_agent = matches!(self.agent, AgentKind::Predictor | AgentKind::Trader);
        if window_agent {
            for t in &self.chain.sim.targets {
                if t.seconds_per_epoch > 0 && self.schedule.action_window_seconds >= t.seconds_per_epoch
                {
                    warnings.push(ConfigWarning::warning(format!(
                        "schedule.action_window_seconds ({}) covers the whole epoch of {}",
                        self.schedule.action_window_seconds, t.address
                    )));
                }
            }
        }

        for t in &self.chain.sim.targets {
            if self.agent == AgentKind::Consumer && t.price.is_none() {
                warnings.push(ConfigWarning::warning(format!(
                    "target {} has no price and will be skipped by the consumer",
                    t.address
                )));
            }
        }

        warnings
    }

    /// `Err` with every error-level message joined, if there are any.
    pub fn ensure_valid(&self) -> Result<()> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SlotError::InvalidConfig(errors.join("; ")))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Target;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.batch.max_batch_size, 20);
        assert_eq!(parsed.submit.max_split_depth, 1);
        assert_eq!(parsed.quota.interval_seconds, DAY_SECONDS);
    }

    #[test]
    fn partial_sections_take_defaults() {
        let yaml = r#"
agent: consumer
quota:
  weekly_budget: 140
batch:
  max_batch_size: 10
chain:
  sim:
    targets:
      - address: "0xa"
        seconds_per_epoch: 300
        price: 2.5
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.agent, AgentKind::Consumer);
        assert_eq!(config.quota.weekly_budget, 140.0);
        assert_eq!(config.quota.grace_seconds, 60);
        assert_eq!(config.batch.max_batch_size, 10);
        assert_eq!(config.batch.max_targets_per_batch, 20);
        assert_eq!(config.chain.sim.targets[0].price, Some(2.5));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let yaml = "batch:\n  max_batch_sise: 10\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn consumer_without_budget_is_an_error() {
        let config = Config {
            agent: AgentKind::Consumer,
            ..Config::default()
        };
        let warnings = config.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("weekly_budget")));
        assert!(config.ensure_valid().is_err());
    }

    #[test]
    fn zero_batch_bounds_are_errors() {
        let mut config = Config::default();
        config.batch.max_batch_size = 0;
        config.batch.max_targets_per_batch = 0;
        let errors = config
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .count();
        assert_eq!(errors, 2);
    }

    #[test]
    fn uneven_interval_is_a_warning() {
        let mut config = Config::default();
        config.quota.interval_seconds = 100_000;
        let w = config.validate();
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].level, WarnLevel::Warning);
    }

    #[test]
    fn excessive_retries_warn() {
        let mut config = Config::default();
        config.submit.max_submit_retries = 11;
        assert!(config.validate()[0].message.contains(">10"));
    }

    #[test]
    fn window_covering_epoch_warns() {
        let mut config = Config::default();
        config.schedule.action_window_seconds = 300;
        config.chain.sim.targets = vec![Target::new("0xa", 300)];
        assert!(config.validate()[0].message.contains("whole epoch"));
    }

    #[test]
    fn cache_path_defaults_per_agent() {
        let root = Path::new("/srv/agent");
        let cache = CacheConfig::default();
        assert_eq!(
            cache.resolve_path(root, AgentKind::Trueval),
            PathBuf::from("/srv/agent/.slotwise/acted-trueval.yaml")
        );
        let cache = CacheConfig {
            backend: CacheBackend::Redb,
            path: Some(PathBuf::from("state/acted.redb")),
        };
        assert_eq!(
            cache.resolve_path(root, AgentKind::Consumer),
            PathBuf::from("/srv/agent/state/acted.redb")
        );
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join(CONFIG_FILE)).unwrap_err();
        assert!(matches!(err, SlotError::ConfigNotFound(_)));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = Config::default();
        config.agent = AgentKind::Trader;
        config.trader.min_confidence = 0.7;
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn discover_walks_up() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "agent: trueval\n").unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(
            Config::discover(&nested),
            Some(dir.path().join(CONFIG_FILE))
        );
    }

    #[test]
    fn opens_both_store_backends() {
        let dir = TempDir::new().unwrap();
        for backend in [CacheBackend::File, CacheBackend::Redb] {
            let cache = CacheConfig {
                backend,
                path: None,
            };
            let mut store = cache.open(dir.path(), AgentKind::Predictor).unwrap();
            store.save("0xa", 3).unwrap();
            assert_eq!(store.load("0xa").unwrap(), Some(3));
        }
    }
}
