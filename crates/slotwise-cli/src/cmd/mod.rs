pub mod cache;
pub mod config;
pub mod epoch;
pub mod pack;
pub mod quota;
pub mod run;

/// `--at` if given, else the wall clock.
pub(crate) fn now_or(at: Option<u64>) -> u64 {
    at.unwrap_or_else(|| u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0))
}
