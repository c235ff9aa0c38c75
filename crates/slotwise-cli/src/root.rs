use slotwise_core::config::{Config, CONFIG_FILE};
use std::path::{Path, PathBuf};

/// Resolve the config file path.
///
/// Priority:
/// 1. `--config` flag / `SLOTWISE_CONFIG` env var (passed in as `explicit`)
/// 2. Nearest `slotwise.yaml` walking upward from the cwd
/// 3. `slotwise.yaml` in the cwd, which may not exist yet
pub fn resolve_config(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    Config::discover(&cwd).unwrap_or_else(|| cwd.join(CONFIG_FILE))
}

/// Directory that relative paths in the config resolve against.
pub fn config_root(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
