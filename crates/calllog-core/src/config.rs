//! Bridge configuration
//!
//! # Example
//!
//! ```rust
//! use calllog_core::config::BridgeConfig;
//!
//! let config = BridgeConfig::from_toml_str(r#"
//!     channel_name = "com.example.calllog"
//!     storage_root = "/sdcard"
//!     call_end_timeout_secs = 600
//! "#).unwrap();
//!
//! assert_eq!(config.end_call_min_api_level, 28);
//! assert!(config.call_end_timeout().is_some());
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::permission::Permission;

/// Default method channel name
pub const DEFAULT_CHANNEL_NAME: &str = "com.example.calllog";

/// First API level that can end calls programmatically
pub const DEFAULT_END_CALL_MIN_API_LEVEL: u32 = 28;

/// Settings for a [`crate::CallLogBridge`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Method channel the host talks on
    pub channel_name: String,
    /// External storage root that recording paths are relative to
    pub storage_root: PathBuf,
    /// Minimum API level for `endCall`
    pub end_call_min_api_level: u32,
    /// Give up waiting for a call to end after this many seconds
    ///
    /// `None` waits indefinitely.
    pub call_end_timeout_secs: Option<u64>,
    /// Capabilities every request needs
    pub base_permissions: Vec<Permission>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            storage_root: PathBuf::from("/sdcard"),
            end_call_min_api_level: DEFAULT_END_CALL_MIN_API_LEVEL,
            call_end_timeout_secs: None,
            base_permissions: vec![Permission::ReadCallLog, Permission::ReadPhoneState],
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    pub fn with_end_call_min_api_level(mut self, level: u32) -> Self {
        self.end_call_min_api_level = level;
        self
    }

    pub fn with_call_end_timeout(mut self, timeout: Duration) -> Self {
        self.call_end_timeout_secs = Some(timeout.as_secs());
        self
    }

    pub fn with_base_permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.base_permissions = permissions;
        self
    }

    pub fn call_end_timeout(&self) -> Option<Duration> {
        self.call_end_timeout_secs.map(Duration::from_secs)
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> BridgeResult<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| BridgeError::config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|e| BridgeError::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.channel_name.trim().is_empty() {
            return Err(BridgeError::config("channel name is required"));
        }
        if !self.storage_root.is_absolute() {
            return Err(BridgeError::config(format!(
                "storage root must be absolute: {}",
                self.storage_root.display()
            )));
        }
        if self.call_end_timeout_secs == Some(0) {
            return Err(BridgeError::config("call end timeout must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.channel_name, "com.example.calllog");
        assert_eq!(config.call_end_timeout(), None);
        assert_eq!(
            config.base_permissions,
            vec![Permission::ReadCallLog, Permission::ReadPhoneState]
        );
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = BridgeConfig::from_toml_str(
            r#"
            storage_root = "/storage/emulated/0"
            end_call_min_api_level = 30
            base_permissions = ["android.permission.READ_CALL_LOG"]
            "#,
        )
        .unwrap();
        assert_eq!(config.storage_root, PathBuf::from("/storage/emulated/0"));
        assert_eq!(config.end_call_min_api_level, 30);
        assert_eq!(config.base_permissions, vec![Permission::ReadCallLog]);
        assert_eq!(config.channel_name, DEFAULT_CHANNEL_NAME);
    }

    #[test]
    fn relative_storage_root_is_rejected() {
        let err = BridgeConfig::new()
            .with_storage_root("relative/dir")
            .validate()
            .unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(BridgeConfig::from_toml_str("call_end_timeout_secs = 0").is_err());
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        fs::write(&path, "channel_name = \"custom.channel\"\n").unwrap();
        let config = BridgeConfig::from_file(&path).unwrap();
        assert_eq!(config.channel_name, "custom.channel");
        assert!(BridgeConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
