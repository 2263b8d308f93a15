//! Client settings types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Settings shared by every connection a manager creates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Debounce window for configuration batches, in milliseconds. `0`
    /// sends each batch on the next scheduler turn.
    pub batch_config_delay_ms: u64,
    /// Append the server session id to the listen URL, for hosts
    /// without a cookie jar.
    pub send_session_id: bool,
    /// Gateway base URL. Connections may override it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    /// Delay between flush attempts while session info is not yet known.
    pub session_retry_delay_ms: u64,
    /// Push-stream reconnect delay when the server sends no `retry:` hint.
    pub reconnect_delay_ms: u64,
    /// Timeout for control requests (connect and configure).
    pub request_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            batch_config_delay_ms: 100,
            send_session_id: false,
            server_url: None,
            session_retry_delay_ms: 100,
            reconnect_delay_ms: 3_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl ClientSettings {
    /// Preset for headless hosts: immediate batches and session propagation.
    pub fn headless() -> Self {
        Self {
            batch_config_delay_ms: 0,
            send_session_id: true,
            ..Self::default()
        }
    }

    /// Debounce window as a [`Duration`].
    pub fn batch_config_delay(&self) -> Duration {
        Duration::from_millis(self.batch_config_delay_ms)
    }

    /// Session retry delay as a [`Duration`].
    pub fn session_retry_delay(&self) -> Duration {
        Duration::from_millis(self.session_retry_delay_ms)
    }

    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Control request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Reject values that would stall the client.
    pub fn validate(&self) -> Result<()> {
        if self.session_retry_delay_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "sessionRetryDelayMs must be positive".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "requestTimeoutMs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Apply a patch in place.
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(v) = patch.batch_config_delay_ms {
            self.batch_config_delay_ms = v;
        }
        if let Some(v) = patch.send_session_id {
            self.send_session_id = v;
        }
        if let Some(v) = &patch.server_url {
            self.server_url = Some(v.clone());
        }
    }
}

/// Partial update applied through the manager's `configure` call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    /// New batch delay.
    #[serde(alias = "batchConfigDelay", skip_serializing_if = "Option::is_none")]
    pub batch_config_delay_ms: Option<u64>,
    /// New session propagation flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_session_id: Option<bool>,
    /// New default server URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
}

impl SettingsPatch {
    /// Set the batch delay.
    #[must_use]
    pub fn batch_config_delay_ms(mut self, ms: u64) -> Self {
        self.batch_config_delay_ms = Some(ms);
        self
    }

    /// Set session propagation.
    #[must_use]
    pub fn send_session_id(mut self, send: bool) -> Self {
        self.send_session_id = Some(send);
        self
    }

    /// Set the default server URL.
    #[must_use]
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }
}
