/// Config schema types (fleet policy, worker listener, localization, access,
/// metrics, chat channels).
use std::{collections::HashMap, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HowlConfig {
    pub fleet: FleetConfig,
    pub workers: WorkersConfig,
    pub locale: LocaleConfig,
    pub access: AccessConfig,
    pub metrics: MetricsConfig,
    pub channels: ChannelsConfig,
}

/// Session placement and worker health policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Maximum sessions a single worker may host.
    pub max_sessions_per_worker: usize,
    /// A removed worker's chats are only told about the shutdown when it held
    /// more than this many sessions.
    pub shutdown_notify_threshold: usize,
    /// Seconds between background health sweeps.
    pub health_interval_secs: u64,
    /// A worker that has sent nothing for this many seconds is removed.
    pub idle_timeout_secs: u64,
}

impl FleetConfig {
    #[must_use]
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            max_sessions_per_worker: 60,
            shutdown_notify_threshold: 2,
            health_interval_secs: 10,
            idle_timeout_secs: 60,
        }
    }
}

/// TCP listener workers connect to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    pub port: u16,
    /// Time a new connection has to send its `hello` frame.
    pub handshake_timeout_ms: u64,
    /// Heartbeat interval announced to workers in `welcome`. Must be well
    /// below `fleet.idle_timeout_secs`.
    pub heartbeat_interval_ms: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 9060,
            handshake_timeout_ms: howl_protocol::HANDSHAKE_TIMEOUT_MS,
            heartbeat_interval_ms: howl_protocol::HEARTBEAT_INTERVAL_MS,
        }
    }
}

/// Language files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocaleConfig {
    /// Directory holding `<locale>.toml` string tables. Relative paths are
    /// resolved against the config file's directory.
    pub dir: PathBuf,
    /// Locale used when a chat has none or a string is missing.
    pub default_locale: String,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("languages"),
            default_locale: "English".into(),
        }
    }
}

/// Who may run privileged commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Operators allowed to run developer commands (`nodes`, `drain`).
    pub dev_user_ids: Vec<i64>,
    /// Global admins.
    pub admin_user_ids: Vec<i64>,
    /// Users barred from blockable commands.
    pub blocked_user_ids: Vec<i64>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Prometheus scrape address, e.g. "127.0.0.1:9100".
    pub listen: Option<String>,
    /// Labels attached to every metric.
    pub labels: HashMap<String, String>,
}

/// Chat channel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Telegram bot settings, parsed by the telegram crate.
    pub telegram: Option<serde_json::Value>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = HowlConfig::default();
        assert_eq!(cfg.fleet.max_sessions_per_worker, 60);
        assert_eq!(cfg.fleet.shutdown_notify_threshold, 2);
        assert_eq!(cfg.fleet.idle_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.workers.port, 9060);
        assert_eq!(cfg.workers.handshake_timeout_ms, 10_000);
        assert_eq!(cfg.workers.heartbeat_interval_ms, 15_000);
        assert_eq!(cfg.locale.default_locale, "English");
        assert!(cfg.channels.telegram.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: HowlConfig = toml::from_str(
            r#"
            [fleet]
            max_sessions_per_worker = 5

            [access]
            dev_user_ids = [42]

            [channels.telegram]
            token = "123:ABC"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.fleet.max_sessions_per_worker, 5);
        assert_eq!(cfg.fleet.shutdown_notify_threshold, 2);
        assert_eq!(cfg.access.dev_user_ids, vec![42]);
        let tg = cfg.channels.telegram.unwrap();
        assert_eq!(tg["token"], "123:ABC");
    }
}
