//! Channel event payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Result, WireError};
use crate::filter::SubscriptionConfig;
use crate::wire::{CHANNEL_FIELD, EVENT_FIELD};

/// A decoded channel frame: an arbitrary field mapping.
///
/// Each subscriber receives its own decoded copy, so mutating one never
/// affects another subscriber of the same frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelEvent(Map<String, Value>);

impl ChannelEvent {
    /// Decode a frame payload. The payload must be a JSON object.
    pub fn parse(data: &str) -> Result<Self> {
        match serde_json::from_str(data)? {
            Value::Object(fields) => Ok(Self(fields)),
            _ => Err(WireError::NotAnObject),
        }
    }

    /// The `jenkins_channel` marker.
    pub fn channel(&self) -> Option<&str> {
        self.0.get(CHANNEL_FIELD).and_then(Value::as_str)
    }

    /// The `jenkins_event` marker.
    pub fn event_kind(&self) -> Option<&str> {
        self.0.get(EVENT_FIELD).and_then(Value::as_str)
    }

    /// A single field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Mutable access to the fields.
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// All fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the raw field mapping.
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Whether this event satisfies `config`.
    pub fn matches(&self, config: &SubscriptionConfig) -> bool {
        config.matches(&self.0)
    }
}

impl From<Map<String, Value>> for ChannelEvent {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_object() {
        let event = ChannelEvent::parse(
            r#"{"jenkins_channel":"job","jenkins_event":"job_run_ended","build_number":"4"}"#,
        )
        .unwrap();
        assert_eq!(event.channel(), Some("job"));
        assert_eq!(event.event_kind(), Some("job_run_ended"));
        assert_eq!(event.get("build_number").and_then(Value::as_str), Some("4"));
    }

    #[test]
    fn parse_rejects_non_object() {
        assert_matches!(ChannelEvent::parse("[1,2]"), Err(WireError::NotAnObject));
        assert_matches!(ChannelEvent::parse("nope"), Err(WireError::Json(_)));
    }

    #[test]
    fn matches_delegates_to_config() {
        let event = ChannelEvent::parse(r#"{"jenkins_channel":"job"}"#).unwrap();
        assert!(event.matches(&SubscriptionConfig::new("job", None)));
        assert!(!event.matches(&SubscriptionConfig::new("queue", None)));
    }

    #[test]
    fn mutation_is_local() {
        let original = ChannelEvent::parse(r#"{"jenkins_channel":"job"}"#).unwrap();
        let mut copy = original.clone();
        let _ = copy.fields_mut().insert("x".into(), Value::Bool(true));
        assert!(original.get("x").is_none());
        assert_eq!(copy.into_fields().len(), 2);
    }
}
