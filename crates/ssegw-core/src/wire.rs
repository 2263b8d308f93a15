//! JSON shapes exchanged with the SSE gateway.
//!
//! Three control surfaces carry these types:
//! - `GET  {server}/sse-gateway/connect?clientId=..`  → [`ConnectResponse`]
//! - `POST {server}/sse-gateway/configure?batchId=..` ← [`ConfigurationRequest`]
//! - the listen stream, whose structural frames decode to [`SessionInfo`]
//!   (`open`) and [`ConfigureAck`] (`configure`)

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{Result, WireError};
use crate::filter::SubscriptionConfig;

/// Reserved event/config field naming the channel.
pub const CHANNEL_FIELD: &str = "jenkins_channel";
/// Event field naming the event kind (used for debug logging only).
pub const EVENT_FIELD: &str = "jenkins_event";

/// Session-open frame name.
pub const OPEN_FRAME: &str = "open";
/// Configuration acknowledgment frame name.
pub const CONFIGURE_FRAME: &str = "configure";
/// Forced reload frame name.
pub const RELOAD_FRAME: &str = "reload";

// ─────────────────────────────────────────────────────────────────────────────
// Session info
// ─────────────────────────────────────────────────────────────────────────────

/// Request-forgery token the server requires on POSTs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Crumb {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// Server session metadata delivered in the `open` frame.
///
/// Older gateways name the dispatcher `dispatcher` and the session
/// `sessionid`; both spellings are accepted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionInfo {
    /// Server-side dispatcher bound to this push stream.
    #[serde(alias = "dispatcher", skip_serializing_if = "Option::is_none")]
    pub dispatcher_id: Option<String>,
    /// HTTP session id.
    #[serde(alias = "sessionid", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Name of the session cookie.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie_name: Option<String>,
    /// Crumb to send on configuration POSTs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crumb: Option<Crumb>,
}

impl SessionInfo {
    /// Decode the payload of an `open` frame.
    pub fn from_frame(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Crumb header as `(name, value)`, when both parts are present.
    pub fn crumb_header(&self) -> Option<(&str, &str)> {
        let crumb = self.crumb.as_ref()?;
        if crumb.name.is_empty() || crumb.value.is_empty() {
            return None;
        }
        Some((crumb.name.as_str(), crumb.value.as_str()))
    }

    /// `Cookie` header value for hosts without a cookie jar.
    pub fn session_cookie(&self) -> Option<String> {
        match (&self.cookie_name, &self.session_id) {
            (Some(name), Some(id)) if !name.is_empty() && !id.is_empty() => {
                Some(format!("{name}={id}"))
            }
            _ => None,
        }
    }
}

/// Response body of the connect control GET.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectResponse {
    /// Session id, appended to the listen URL when session propagation is on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsessionid: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration batches
// ─────────────────────────────────────────────────────────────────────────────

/// Body of a configuration POST.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationRequest {
    /// Subscribe deltas in call order.
    #[serde(default)]
    pub subscribe: Vec<SubscriptionConfig>,
    /// Unsubscribe deltas in call order.
    #[serde(default)]
    pub unsubscribe: Vec<SubscriptionConfig>,
    /// Dispatcher the deltas apply to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatcher_id: Option<String>,
}

impl ConfigurationRequest {
    /// Whether the request carries no deltas.
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

/// Payload of a `configure` acknowledgment frame.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureAck {
    /// The acknowledged batch.
    #[serde(deserialize_with = "batch_id_from_number_or_string")]
    pub batch_id: u64,
}

impl ConfigureAck {
    /// Decode the payload of a `configure` frame.
    pub fn from_frame(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

fn batch_id_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(WireError::InvalidBatchId(s))),
    }
}
