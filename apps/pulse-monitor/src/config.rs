// [apps/pulse-monitor/src/config.rs]
//! Environment-driven bootstrap config, read once at process start
//! before anything else runs.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PVE_POLL_SECS: u64 = 10;
const DEFAULT_PBS_POLL_SECS: u64 = 30;
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_FULL_SNAPSHOT_EVERY_N_DELTAS: u32 = 100;
const DEFAULT_NOTIFICATION_WORKERS: usize = 5;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub listen_port: u16,
    pub mock_mode: bool,
    pub default_pve_poll_interval: Duration,
    pub default_pbs_poll_interval: Duration,
    pub full_snapshot_every_n_deltas: u32,
    pub notification_worker_count: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./data")),
            listen_port: parse_env_or("PORT", DEFAULT_PORT),
            mock_mode: std::env::var("PULSE_MOCK_MODE").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false),
            default_pve_poll_interval: Duration::from_secs(parse_env_or("PVE_POLL_INTERVAL_SECS", DEFAULT_PVE_POLL_SECS)),
            default_pbs_poll_interval: Duration::from_secs(parse_env_or("PBS_POLL_INTERVAL_SECS", DEFAULT_PBS_POLL_SECS)),
            full_snapshot_every_n_deltas: parse_env_or("FULL_SNAPSHOT_EVERY_N_DELTAS", DEFAULT_FULL_SNAPSHOT_EVERY_N_DELTAS),
            notification_worker_count: parse_env_or("NOTIFICATION_WORKERS", DEFAULT_NOTIFICATION_WORKERS),
        }
    }

    pub fn sources_file(&self) -> PathBuf {
        self.data_dir.join("sources.enc")
    }

    pub fn alert_rules_file(&self) -> PathBuf {
        self.data_dir.join("alerts.json")
    }

    pub fn notifications_db_path(&self) -> PathBuf {
        self.data_dir.join("notifications").join("queue.db")
    }

    pub fn encryption_key_file(&self) -> PathBuf {
        self.data_dir.join(".encryption.key")
    }
}

fn parse_env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_env_falls_back_to_documented_defaults() {
        for key in ["DATA_DIR", "PORT", "PULSE_MOCK_MODE", "PVE_POLL_INTERVAL_SECS", "PBS_POLL_INTERVAL_SECS"] {
            std::env::remove_var(key);
        }
        let config = AppConfig::from_env();
        assert_eq!(config.listen_port, DEFAULT_PORT);
        assert!(!config.mock_mode);
        assert_eq!(config.default_pve_poll_interval, Duration::from_secs(DEFAULT_PVE_POLL_SECS));
        assert_eq!(config.default_pbs_poll_interval, Duration::from_secs(DEFAULT_PBS_POLL_SECS));
    }
}
