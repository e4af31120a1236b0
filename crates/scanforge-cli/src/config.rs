//! On-disk CLI configuration: the options table named in spec §6,
//! loaded from `~/.config/scanforge/config.toml` (or `--config`). Follows
//! the teacher's own `config_dir()`/`load_config()`/`save_config()`
//! pattern, generalized from a single database URL to the orchestrator's
//! tunable defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The full options table (spec §6 "Configuration"). Every field has a
/// spec-mandated default so a missing config file is never fatal --
/// `scanforge` runs out of the box with these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanforgeConfig {
    pub max_concurrent_scans: usize,
    pub max_queue_size: usize,
    pub default_timeout_minutes: u64,
    pub retry_attempts: u32,
    pub resource_monitoring_interval_secs: u64,
    pub safety_margin: f64,
    pub business_hours_start: u32,
    pub business_hours_end: u32,
    pub peak_hours_start: u32,
    pub peak_hours_end: u32,
    pub maintenance_window_start: u32,
    pub maintenance_window_end: u32,
    pub workflow_timeout_hours: i64,
    pub approval_timeout_hours: i64,
    pub auto_approval_threshold: f64,
}

impl Default for ScanforgeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scans: 100,
            max_queue_size: 1000,
            default_timeout_minutes: 60,
            retry_attempts: 3,
            resource_monitoring_interval_secs: 30,
            safety_margin: 0.2,
            business_hours_start: 9,
            business_hours_end: 17,
            peak_hours_start: 10,
            peak_hours_end: 16,
            maintenance_window_start: 2,
            maintenance_window_end: 4,
            workflow_timeout_hours: 24,
            approval_timeout_hours: 72,
            auto_approval_threshold: 0.9,
        }
    }
}

/// `~/.config/scanforge/config.toml`, or `$XDG_CONFIG_HOME/scanforge/config.toml`
/// when set (via the `dirs` crate, matching the teacher's own
/// `config_dir()` helper).
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scanforge")
        .join("config.toml")
}

/// Load the config file if present; fall back to spec defaults
/// otherwise. A malformed file is an error -- silently ignoring it would
/// hide a typo'd tunable from the operator.
pub fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ScanforgeConfig> {
    let path = path.cloned().unwrap_or_else(config_path);
    if !path.exists() {
        return Ok(ScanforgeConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    toml::from_str(&contents).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
}

pub fn save_config(config: &ScanforgeConfig, path: Option<&PathBuf>) -> anyhow::Result<PathBuf> {
    let path = path.cloned().unwrap_or_else(config_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rendered = toml::to_string_pretty(config)?;
    std::fs::write(&path, rendered)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = ScanforgeConfig::default();
        assert_eq!(config.max_concurrent_scans, 100);
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.safety_margin, 0.2);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = PathBuf::from("/nonexistent/scanforge/config.toml");
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.max_concurrent_scans, 100);
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = ScanforgeConfig::default();
        config.max_concurrent_scans = 42;
        save_config(&config, Some(&path)).unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.max_concurrent_scans, 42);
    }
}
