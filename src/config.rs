//! Settings, loadable from a JSON file.

use crate::protocol;
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            console_logging_enabled: default_true(),
            file_logging_enabled: default_false(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "movehub".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Control characteristic commands are written to.
    #[serde(default = "default_control_characteristic")]
    pub control_characteristic: Uuid,
    /// How long a scan waits for the hub to advertise.
    #[serde(default = "default_scan_duration_secs")]
    pub scan_duration_secs: u64,
    /// Optional per-operation transport timeout. Absent means none: a hung
    /// transport call waits forever.
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
    #[serde(default)]
    pub log: LogSettings,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            control_characteristic: default_control_characteristic(),
            scan_duration_secs: default_scan_duration_secs(),
            operation_timeout_secs: None,
            log: LogSettings::default(),
        }
    }
}

fn default_control_characteristic() -> Uuid {
    protocol::CONTROL_CHARACTERISTIC_UUID
}
fn default_scan_duration_secs() -> u64 {
    10
}

impl HubSettings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            control_characteristic: self.control_characteristic,
            operation_timeout: self.operation_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_protocol_identifiers() {
        let settings = HubSettings::default();
        assert_eq!(
            settings.control_characteristic,
            protocol::CONTROL_CHARACTERISTIC_UUID
        );
        assert_eq!(settings.session_config().operation_timeout, None);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: HubSettings =
            serde_json::from_str(r#"{ "operation_timeout_secs": 5 }"#).unwrap();
        assert_eq!(settings.scan_duration_secs, 10);
        assert_eq!(
            settings.session_config().operation_timeout,
            Some(Duration::from_secs(5))
        );
        assert_eq!(settings.log.level, "info");
    }
}
