//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vspeed_models::{AccelerationSettings, RawSettings, SettingWarning};

/// Prefix of every environment variable read by the worker.
pub const ENV_PREFIX: &str = "VSPEED_";

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent probes and encodes
    pub max_parallel: usize,
    /// Timeout for each external process (FFmpeg, espeak)
    pub process_timeout: Duration,
    /// Work directory for fragments and intermediate files
    pub work_dir: PathBuf,
    /// Keep a run's fragments after it succeeds; failed runs always keep them
    pub keep_work_dir: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            process_timeout: Duration::from_secs(600), // 10 minutes
            work_dir: std::env::temp_dir().join("vspeed"),
            keep_work_dir: false,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        Self {
            max_parallel: get("MAX_PARALLEL")
                .and_then(|s| s.trim().parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.max_parallel),
            process_timeout: get("PROCESS_TIMEOUT")
                .and_then(|s| s.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.process_timeout),
            work_dir: get("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            keep_work_dir: get("KEEP_WORK_DIR")
                .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.keep_work_dir),
        }
    }

    /// Process timeout in whole seconds, as the media runners expect it.
    pub fn timeout_secs(&self) -> u64 {
        self.process_timeout.as_secs().max(1)
    }
}

/// Resolve acceleration settings from environment variables.
pub fn settings_from_env() -> (AccelerationSettings, Vec<SettingWarning>) {
    let raw = RawSettings::from_lookup(ENV_PREFIX, |key| std::env::var(key).ok());
    AccelerationSettings::resolve(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.max_parallel, 4);
        assert_eq!(config.process_timeout, Duration::from_secs(600));
        assert!(config.work_dir.ends_with("vspeed"));
        assert!(!config.keep_work_dir);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("VSPEED_MAX_PARALLEL", "0"),
            ("VSPEED_PROCESS_TIMEOUT", " 30 "),
            ("VSPEED_WORK_DIR", "/data/vspeed"),
        ]));
        assert_eq!(config.max_parallel, 4);
        assert_eq!(config.timeout_secs(), 30);
        assert_eq!(config.work_dir, PathBuf::from("/data/vspeed"));
        assert!(!config.keep_work_dir);

        let config = WorkerConfig::from_lookup(lookup(&[("VSPEED_KEEP_WORK_DIR", "True")]));
        assert!(config.keep_work_dir);

        let config = WorkerConfig::from_lookup(lookup(&[("VSPEED_MAX_PARALLEL", "eight")]));
        assert_eq!(config.max_parallel, 4);
    }
}
