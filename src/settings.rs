//! Device settings loaded from the JSON config file.
//!
//! Keys are the upper-case names the provisioning tooling writes, e.g.
//! `CLIENT_UID` or `WEBSOCKET_HOSTNAME`. Optional values fall back to their
//! defaults when absent, and also when empty or zero.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::device::{DEFAULT_PULSE, DEFAULT_SETTLE};
use crate::error::{Error, Result};
use crate::protocol::HandshakeParams;
use crate::queue::DrainOrder;

/// Where the config lives on the device.
pub const DEFAULT_PATH: &str = "/config.json";

/// Keys that must be present.
pub const REQUIRED: [&str; 5] = [
    "CLIENT_UID",
    "WEBSOCKET_HOSTNAME",
    "WEBSOCKET_PASSWORD",
    "WIFI_NETWORK",
    "WIFI_PASSWORD",
];

/// Raw contents of the config file. Use the accessors, which apply defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DeviceConfig {
    client_uid: Option<String>,
    websocket_hostname: Option<String>,
    websocket_port: Option<u16>,
    websocket_path: Option<String>,
    websocket_tls: Option<bool>,
    websocket_user: Option<String>,
    websocket_password: Option<String>,
    wifi_network: Option<String>,
    wifi_password: Option<String>,
    resource_uid: Option<String>,
    lock_open_pin: Option<u8>,
    lock_close_pin: Option<u8>,
    door_status_pin: Option<u8>,
    power_status_pin: Option<u8>,
    debug: Option<bool>,
    lock_pulse_ms: Option<u64>,
    door_settle_ms: Option<u64>,
    door_check_interval_ms: Option<u64>,
    outbound_drain_order: Option<DrainOrder>,
    outbound_queue_limit: Option<usize>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn non_zero<T: Default + PartialEq + Copy>(value: Option<T>) -> Option<T> {
    value.filter(|v| *v != T::default())
}

impl DeviceConfig {
    /// Read and validate the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read, is not valid
    /// JSON of the expected shape, or lacks a required key.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// Parse and validate config JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed input or missing required keys.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every required key is present, reporting all that are not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] with `missing values: A, B`.
    pub fn validate(&self) -> Result<()> {
        let present = [
            self.client_uid.is_some(),
            self.websocket_hostname.is_some(),
            self.websocket_password.is_some(),
            self.wifi_network.is_some(),
            self.wifi_password.is_some(),
        ];
        let missing: Vec<&str> = REQUIRED
            .iter()
            .zip(present)
            .filter(|(_, ok)| !ok)
            .map(|(key, _)| *key)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!("missing values: {}", missing.join(", "))))
        }
    }

    #[must_use]
    pub fn client_uid(&self) -> &str {
        self.client_uid.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn websocket_hostname(&self) -> &str {
        self.websocket_hostname.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn websocket_port(&self) -> u16 {
        non_zero(self.websocket_port).unwrap_or(443)
    }

    #[must_use]
    pub fn websocket_path(&self) -> String {
        non_empty(self.websocket_path.as_deref())
            .map_or_else(|| format!("/connect/{}", self.client_uid()), str::to_string)
    }

    #[must_use]
    pub fn websocket_tls(&self) -> bool {
        self.websocket_tls.unwrap_or(true)
    }

    #[must_use]
    pub fn websocket_user(&self) -> &str {
        non_empty(self.websocket_user.as_deref()).unwrap_or_else(|| self.client_uid())
    }

    #[must_use]
    pub fn websocket_password(&self) -> &str {
        self.websocket_password.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn wifi_network(&self) -> &str {
        self.wifi_network.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn wifi_password(&self) -> &str {
        self.wifi_password.as_deref().unwrap_or_default()
    }

    /// Identifier reported with lock events.
    #[must_use]
    pub fn resource_uid(&self) -> &str {
        non_empty(self.resource_uid.as_deref()).unwrap_or_else(|| self.client_uid())
    }

    #[must_use]
    pub fn lock_open_pin(&self) -> u8 {
        non_zero(self.lock_open_pin).unwrap_or(26)
    }

    #[must_use]
    pub fn lock_close_pin(&self) -> u8 {
        non_zero(self.lock_close_pin).unwrap_or(27)
    }

    #[must_use]
    pub fn door_status_pin(&self) -> u8 {
        non_zero(self.door_status_pin).unwrap_or(33)
    }

    #[must_use]
    pub fn power_status_pin(&self) -> u8 {
        non_zero(self.power_status_pin).unwrap_or(34)
    }

    /// Log raw payloads.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug.unwrap_or(false)
    }

    #[must_use]
    pub fn lock_pulse(&self) -> Duration {
        non_zero(self.lock_pulse_ms).map_or(DEFAULT_PULSE, Duration::from_millis)
    }

    #[must_use]
    pub fn door_settle(&self) -> Duration {
        non_zero(self.door_settle_ms).map_or(DEFAULT_SETTLE, Duration::from_millis)
    }

    /// Period of the door comparator; `None` disables it.
    #[must_use]
    pub fn door_check_interval(&self) -> Option<Duration> {
        non_zero(self.door_check_interval_ms).map(Duration::from_millis)
    }

    #[must_use]
    pub fn outbound_drain_order(&self) -> DrainOrder {
        self.outbound_drain_order.unwrap_or_default()
    }

    /// Outbound queue bound; `None` is unbounded.
    #[must_use]
    pub fn outbound_queue_limit(&self) -> Option<usize> {
        non_zero(self.outbound_queue_limit)
    }

    /// Upgrade request parameters for the control server.
    #[must_use]
    pub fn handshake_params(&self) -> HandshakeParams {
        HandshakeParams {
            host: self.websocket_hostname().to_string(),
            port: self.websocket_port(),
            path: self.websocket_path(),
            user: self.websocket_user().to_string(),
            password: self.websocket_password().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "CLIENT_UID": "dev-1",
        "WEBSOCKET_HOSTNAME": "locks.example.com",
        "WEBSOCKET_PASSWORD": "pw",
        "WIFI_NETWORK": "office",
        "WIFI_PASSWORD": "wifi-pw"
    }"#;

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.client_uid(), "dev-1");
        assert_eq!(config.websocket_port(), 443);
        assert_eq!(config.websocket_path(), "/connect/dev-1");
        assert!(config.websocket_tls());
        assert_eq!(config.websocket_user(), "dev-1");
        assert_eq!(config.resource_uid(), "dev-1");
        assert_eq!(config.lock_open_pin(), 26);
        assert_eq!(config.lock_close_pin(), 27);
        assert_eq!(config.door_status_pin(), 33);
        assert_eq!(config.power_status_pin(), 34);
        assert!(!config.debug());
        assert_eq!(config.lock_pulse(), Duration::from_millis(1000));
        assert_eq!(config.door_settle(), Duration::from_millis(500));
        assert_eq!(config.door_check_interval(), None);
        assert_eq!(config.outbound_drain_order(), DrainOrder::Lifo);
        assert_eq!(config.outbound_queue_limit(), None);
    }

    #[test]
    fn test_overrides() {
        let raw = r#"{
            "CLIENT_UID": "dev-1",
            "WEBSOCKET_HOSTNAME": "10.0.0.2",
            "WEBSOCKET_PORT": 8080,
            "WEBSOCKET_PATH": "/ws",
            "WEBSOCKET_TLS": false,
            "WEBSOCKET_USER": "operator",
            "WEBSOCKET_PASSWORD": "pw",
            "WIFI_NETWORK": "n",
            "WIFI_PASSWORD": "p",
            "RESOURCE_UID": "door-7",
            "DEBUG": true,
            "LOCK_PULSE_MS": 750,
            "DOOR_CHECK_INTERVAL_MS": 5000,
            "OUTBOUND_DRAIN_ORDER": "fifo",
            "OUTBOUND_QUEUE_LIMIT": 64
        }"#;
        let config = DeviceConfig::from_json(raw).unwrap();
        let params = config.handshake_params();
        assert_eq!(params.host, "10.0.0.2");
        assert_eq!(params.port, 8080);
        assert_eq!(params.path, "/ws");
        assert_eq!(params.user, "operator");
        assert_eq!(params.password, "pw");
        assert!(!config.websocket_tls());
        assert_eq!(config.resource_uid(), "door-7");
        assert!(config.debug());
        assert_eq!(config.lock_pulse(), Duration::from_millis(750));
        assert_eq!(config.door_check_interval(), Some(Duration::from_secs(5)));
        assert_eq!(config.outbound_drain_order(), DrainOrder::Fifo);
        assert_eq!(config.outbound_queue_limit(), Some(64));
    }

    #[test]
    fn test_empty_and_zero_fall_back() {
        let raw = r#"{
            "CLIENT_UID": "dev-1",
            "WEBSOCKET_HOSTNAME": "h",
            "WEBSOCKET_PASSWORD": "pw",
            "WIFI_NETWORK": "n",
            "WIFI_PASSWORD": "p",
            "WEBSOCKET_PORT": 0,
            "WEBSOCKET_PATH": "",
            "WEBSOCKET_USER": "",
            "LOCK_OPEN_PIN": 0
        }"#;
        let config = DeviceConfig::from_json(raw).unwrap();
        assert_eq!(config.websocket_port(), 443);
        assert_eq!(config.websocket_path(), "/connect/dev-1");
        assert_eq!(config.websocket_user(), "dev-1");
        assert_eq!(config.lock_open_pin(), 26);
    }

    #[test]
    fn test_missing_keys_all_listed() {
        let err = DeviceConfig::from_json(r#"{"CLIENT_UID": "dev-1", "WIFI_NETWORK": "n"}"#)
            .unwrap_err();
        match err {
            Error::Config(msg) => assert_eq!(
                msg,
                "missing values: WEBSOCKET_HOSTNAME, WEBSOCKET_PASSWORD, WIFI_PASSWORD"
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            DeviceConfig::from_json("[1, 2"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DeviceConfig::from_json(r#"{"WEBSOCKET_PORT": "not a number"}"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = DeviceConfig::load(file.path()).unwrap();
        assert_eq!(config.websocket_hostname(), "locks.example.com");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let err = DeviceConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("config.json")));
    }
}
