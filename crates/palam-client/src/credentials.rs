//! Credential bundle and persisted config shapes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ClientError, Result};
use crate::host::HostShell;

/// Server identity carried on every connection attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub server_url: String,
    pub username: String,
    pub token: String,
}

impl Credentials {
    /// A socket may only be created with a non-empty token.
    pub fn can_connect(&self) -> bool {
        !self.token.is_empty()
    }
}

/// Persisted client config, stored through the host shell as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub authentication: AuthenticationConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub token: String,
    /// Reversibly-encoded password copy for login form re-fill. See
    /// [`insecure_password_cache`]; this is convenience, not secure storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_enc: Option<String>,
}

impl PersistedConfig {
    /// Credentials stored in this config, when a token is present.
    pub fn credentials(&self) -> Option<Credentials> {
        if self.authentication.token.is_empty() {
            return None;
        }
        Some(Credentials {
            server_url: self.server.url.clone(),
            username: self.authentication.username.clone(),
            token: self.authentication.token.clone(),
        })
    }

    /// Drop every secret while keeping the server URL and username for the
    /// next login form.
    pub fn strip_secrets(&mut self) {
        self.authentication.token.clear();
        self.authentication.password_enc = None;
    }
}

/// Load the persisted config, falling back to defaults on any config error.
pub fn load_persisted(host: &dyn HostShell) -> PersistedConfig {
    match host.load_config() {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(config) => config,
            Err(error) => {
                warn!("persisted config is unreadable, using defaults: {error}");
                PersistedConfig::default()
            }
        },
        Ok(None) => PersistedConfig::default(),
        Err(error) => {
            warn!("persisted config failed to load, using defaults: {error}");
            PersistedConfig::default()
        }
    }
}

/// Persist the config through the host shell.
pub fn store_persisted(host: &dyn HostShell, config: &PersistedConfig) -> Result<()> {
    let value = serde_json::to_value(config)?;
    host.store_config(&value)
        .map_err(|error| ClientError::Config(error.to_string()))
}

/// Weak, reversible password echo for the login form.
///
/// Not encryption and never treated as such. Exists only so a teacher who
/// opts in does not retype the password on every launch.
pub mod insecure_password_cache {
    use super::{BASE64, Engine};

    /// Encode a plaintext password for persistence.
    pub fn encode(plain: &str) -> String {
        BASE64.encode(plain.as_bytes())
    }

    /// Decode a persisted password echo; `None` when the stored value is not
    /// valid output of [`encode`].
    pub fn decode(stored: &str) -> Option<String> {
        let bytes = BASE64.decode(stored).ok()?;
        String::from_utf8(bytes).ok()
    }
}
