//! # Session Configuration
//!
//! Loaded once per session from TOML. Every field has a default, so an empty
//! document is a valid configuration.
//!
//! ```toml
//! [requests]
//! mod_info_timeout_secs = 5.0
//! lobby_phase_timeout_secs = 20.0
//! max_pending = 1024
//! blacklist = ["Some.Broken.Mod"]
//! keep_downloaded_mods = false
//!
//! [channel]
//! capacity = 1024
//!
//! [teams]
//! shuffle_seed = 7
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_shared::{DEFAULT_LOBBY_PHASE_TIMEOUT_SECS, DEFAULT_MOD_INFO_TIMEOUT_SECS};

use crate::error::{SessionError, SessionResult};

/// Top-level session configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Correlated request settings.
    pub requests: RequestConfig,
    /// Loopback channel settings.
    pub channel: ChannelConfig,
    /// Team assignment settings.
    pub teams: TeamConfig,
}

/// Correlated request settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Deadline for a mod availability query, in seconds.
    pub mod_info_timeout_secs: f32,
    /// Deadline for each lobby discovery phase, in seconds.
    pub lobby_phase_timeout_secs: f32,
    /// Maximum number of requests in flight at once.
    pub max_pending: usize,
    /// Mod barcodes that are never requested.
    pub blacklist: Vec<String>,
    /// Keep installed mods after the session instead of treating them as temporary.
    pub keep_downloaded_mods: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            mod_info_timeout_secs: DEFAULT_MOD_INFO_TIMEOUT_SECS,
            lobby_phase_timeout_secs: DEFAULT_LOBBY_PHASE_TIMEOUT_SECS,
            max_pending: 1024,
            blacklist: Vec::new(),
            keep_downloaded_mods: false,
        }
    }
}

impl RequestConfig {
    /// Mod query deadline as a [`Duration`].
    #[must_use]
    pub fn mod_info_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.mod_info_timeout_secs)
    }

    /// Lobby phase deadline as a [`Duration`].
    #[must_use]
    pub fn lobby_phase_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.lobby_phase_timeout_secs)
    }

    /// Returns true if `barcode` must not be requested.
    #[must_use]
    pub fn is_blacklisted(&self, barcode: &str) -> bool {
        self.blacklist.iter().any(|b| b == barcode)
    }
}

/// Loopback channel settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Depth of each endpoint's inbound queue.
    pub capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Team assignment settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamConfig {
    /// Seed for the shuffle used by random team assignment.
    pub shuffle_seed: u64,
}

impl SessionConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] if the document does not parse
    /// or fails validation.
    pub fn from_toml_str(source: &str) -> SessionResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| SessionError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] if the file cannot be read or
    /// its contents are invalid.
    pub fn from_file(path: impl AsRef<Path>) -> SessionResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            SessionError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> SessionResult<()> {
        let timeouts = [
            ("requests.mod_info_timeout_secs", self.requests.mod_info_timeout_secs),
            ("requests.lobby_phase_timeout_secs", self.requests.lobby_phase_timeout_secs),
        ];
        for (name, secs) in timeouts {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(SessionError::InvalidConfig(format!(
                    "{name} must be a positive number of seconds, got {secs}"
                )));
            }
        }
        if self.requests.max_pending == 0 {
            return Err(SessionError::InvalidConfig(
                "requests.max_pending must be at least 1".to_string(),
            ));
        }
        if self.channel.capacity == 0 {
            return Err(SessionError::InvalidConfig(
                "channel.capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = SessionConfig::from_toml_str("").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.requests.mod_info_timeout(), Duration::from_secs(5));
        assert_eq!(config.requests.lobby_phase_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_partial_document() {
        let config = SessionConfig::from_toml_str(
            r#"
            [requests]
            mod_info_timeout_secs = 2.5
            blacklist = ["Bad.Mod"]

            [teams]
            shuffle_seed = 42
            "#,
        )
        .unwrap();

        assert_eq!(config.requests.mod_info_timeout(), Duration::from_millis(2500));
        assert_eq!(config.requests.max_pending, 1024);
        assert!(config.requests.is_blacklisted("Bad.Mod"));
        assert!(!config.requests.is_blacklisted("Good.Mod"));
        assert_eq!(config.teams.shuffle_seed, 42);
    }

    #[test]
    fn test_rejects_non_positive_timeout() {
        let err = SessionConfig::from_toml_str("[requests]\nlobby_phase_timeout_secs = 0.0\n")
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig(msg) if msg.contains("lobby_phase")));
    }

    #[test]
    fn test_rejects_zero_pending_limit() {
        assert!(SessionConfig::from_toml_str("[requests]\nmax_pending = 0\n").is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(SessionConfig::from_toml_str("requests = 5").is_err());
    }
}
