//! Host configuration file.
//!
//! ```json
//! {
//!   "port": "/dev/ttyUSB0",
//!   "baud": 115200,
//!   "rx_mode": "interrupt",
//!   "driver": { "join_timeout_ms": 20000 },
//!   "wifi": { "ssid": "lab", "password": "secret" },
//!   "remote": { "kind": "tcp", "host": "192.168.1.10", "port": 8080 }
//! }
//! ```
//!
//! Every field is optional; missing ones take their defaults.

use std::fs;
use std::path::Path;

use esp8266_at::{ConnectionKind, DriverConfig};
use serde::{Deserialize, Serialize};

use crate::error::HostResult;

/// How received bytes reach the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RxMode {
    /// Reader thread pushing into a ring buffer
    #[default]
    Interrupt,
    /// Driver reads the port directly
    Polled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEndpoint {
    #[serde(default = "default_kind")]
    pub kind: ConnectionKind,
    pub host: String,
    pub port: u16,
    /// Local port, UDP only
    #[serde(default)]
    pub local_port: Option<u16>,
}

fn default_kind() -> ConnectionKind {
    ConnectionKind::Tcp
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Serial device path
    pub port: String,
    /// Rate the port is opened at
    pub baud: u32,
    pub rx_mode: RxMode,
    pub driver: DriverConfig,
    pub wifi: Option<WifiCredentials>,
    pub remote: Option<RemoteEndpoint>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            port: default_port().to_string(),
            baud: 115_200,
            rx_mode: RxMode::default(),
            driver: DriverConfig::default(),
            wifi: None,
            remote: None,
        }
    }
}

#[cfg(windows)]
fn default_port() -> &'static str {
    "COM3"
}

#[cfg(not(windows))]
fn default_port() -> &'static str {
    "/dev/ttyUSB0"
}

impl HostConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> HostResult<Self> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> HostResult<Self> {
        let mut config: HostConfig = serde_json::from_str(text)?;
        // The driver starts out assuming the rate the port was opened at
        config.driver.initial_baud = config.baud;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = HostConfig::from_json("{}").unwrap();
        assert_eq!(config.baud, 115_200);
        assert_eq!(config.rx_mode, RxMode::Interrupt);
        assert_eq!(config.driver, DriverConfig::default());
        assert!(config.wifi.is_none());
        assert!(config.remote.is_none());
    }

    #[test]
    fn test_full_document() {
        let json = r#"{
            "port": "/dev/ttyACM1",
            "baud": 9600,
            "rx_mode": "polled",
            "driver": { "join_attempts": 4, "quiet_period_ms": null },
            "wifi": { "ssid": "lab", "password": "secret" },
            "remote": { "kind": "udp", "host": "10.0.0.2", "port": 5000, "local_port": 4000 }
        }"#;
        let config = HostConfig::from_json(json).unwrap();

        assert_eq!(config.port, "/dev/ttyACM1");
        assert_eq!(config.rx_mode, RxMode::Polled);
        assert_eq!(config.driver.join_attempts, 4);
        assert_eq!(config.driver.quiet_period_ms, None);
        assert_eq!(config.driver.initial_baud, 9600);
        assert_eq!(config.driver.ok_timeout_ms, DriverConfig::default().ok_timeout_ms);
        assert_eq!(
            config.wifi,
            Some(WifiCredentials { ssid: "lab".into(), password: "secret".into() })
        );

        let remote = config.remote.unwrap();
        assert_eq!(remote.kind, ConnectionKind::Udp);
        assert_eq!(remote.local_port, Some(4000));
    }

    #[test]
    fn test_remote_kind_defaults_to_tcp() {
        let config =
            HostConfig::from_json(r#"{ "remote": { "host": "example.org", "port": 80 } }"#).unwrap();
        assert_eq!(config.remote.map(|r| r.kind), Some(ConnectionKind::Tcp));
    }

    #[test]
    fn test_unknown_rx_mode_is_rejected() {
        let result = HostConfig::from_json(r#"{ "rx_mode": "dma" }"#);
        assert!(matches!(result, Err(crate::error::HostError::Config(_))));
    }
}
