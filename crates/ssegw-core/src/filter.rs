//! Subscription configs and event filter matching.
//!
//! A subscription config is the caller's filter plus the reserved
//! [`CHANNEL_FIELD`]. An event matches a config when every config field is
//! present in the event and string-equal to it. Values are compared by their
//! string form, never by type: the gateway relays events as strings, while
//! callers may write filter values as numbers or booleans.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::wire::CHANNEL_FIELD;

/// Caller-supplied filter: a flat mapping of field name to expected value.
pub type Filter = Map<String, Value>;

/// Filter plus channel name, as sent to the server and matched locally.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionConfig(Map<String, Value>);

impl SubscriptionConfig {
    /// Build a config for `channel`, cloning `filter` if given.
    ///
    /// The channel name always wins over a `jenkins_channel` key in the filter.
    pub fn new(channel: &str, filter: Option<&Filter>) -> Self {
        let mut fields = filter.cloned().unwrap_or_default();
        let _ = fields.insert(CHANNEL_FIELD.to_owned(), Value::String(channel.to_owned()));
        Self(fields)
    }

    /// The channel this config targets.
    pub fn channel(&self) -> Option<&str> {
        self.0.get(CHANNEL_FIELD).and_then(Value::as_str)
    }

    /// All fields, including the channel.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Whether `event` satisfies this config.
    pub fn matches(&self, event: &Map<String, Value>) -> bool {
        contains_all(event, &self.0)
    }
}

/// Whether every field of `filter` is present in `event` with an equal string form.
///
/// An empty filter matches everything.
pub fn contains_all(event: &Map<String, Value>, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(field, expected)| {
        event
            .get(field)
            .is_some_and(|actual| coerce_to_string(actual) == coerce_to_string(expected))
    })
}

/// String form used for filter comparison.
///
/// Strings compare by content, scalars by their JSON text, and arrays and
/// objects by their compact JSON encoding.
pub fn coerce_to_string(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Null => Cow::Borrowed("null"),
        Value::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        Value::Number(n) => Cow::Owned(n.to_string()),
        Value::Array(_) | Value::Object(_) => Cow::Owned(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn new_config_adds_channel() {
        let config = SubscriptionConfig::new("job", None);
        assert_eq!(config.channel(), Some("job"));
        assert_eq!(config.fields().len(), 1);
    }

    #[test]
    fn new_config_clones_filter() {
        let mut filter = object(json!({"job_name": "a"}));
        let config = SubscriptionConfig::new("job", Some(&filter));
        let _ = filter.insert("job_name".into(), json!("b"));
        assert_eq!(config.fields()["job_name"], "a");
    }

    #[test]
    fn channel_overrides_filter_channel() {
        let filter = object(json!({"jenkins_channel": "other"}));
        let config = SubscriptionConfig::new("job", Some(&filter));
        assert_eq!(config.channel(), Some("job"));
    }

    #[test]
    fn channel_only_matches_any_event_on_channel() {
        let config = SubscriptionConfig::new("job", None);
        let event = object(json!({
            "jenkins_channel": "job",
            "jenkins_event": "job_run_started",
            "job_name": "x"
        }));
        assert!(config.matches(&event));
    }

    #[test]
    fn other_channel_does_not_match() {
        let config = SubscriptionConfig::new("job", None);
        let event = object(json!({"jenkins_channel": "pipeline"}));
        assert!(!config.matches(&event));
    }

    #[test]
    fn numeric_filter_matches_string_field() {
        let filter = object(json!({"build_number": 3}));
        let config = SubscriptionConfig::new("job", Some(&filter));
        let hit = object(json!({"jenkins_channel": "job", "build_number": "3"}));
        let miss = object(json!({"jenkins_channel": "job", "build_number": "30"}));
        assert!(config.matches(&hit));
        assert!(!config.matches(&miss));
    }

    #[test]
    fn missing_field_does_not_match() {
        let filter = object(json!({"job_name": "a"}));
        let config = SubscriptionConfig::new("job", Some(&filter));
        let event = object(json!({"jenkins_channel": "job"}));
        assert!(!config.matches(&event));
    }

    #[test]
    fn bool_and_null_coercion() {
        assert_eq!(coerce_to_string(&json!(true)), "true");
        assert_eq!(coerce_to_string(&json!(null)), "null");
        assert_eq!(coerce_to_string(&json!(2.5)), "2.5");
        assert_eq!(coerce_to_string(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(contains_all(&object(json!({"a": 1})), &Map::new()));
        assert!(contains_all(&Map::new(), &Map::new()));
    }

    #[test]
    fn config_serializes_flat() {
        let filter = object(json!({"job_name": "a"}));
        let config = SubscriptionConfig::new("job", Some(&filter));
        assert_eq!(
            serde_json::to_value(&config).unwrap(),
            json!({"job_name": "a", "jenkins_channel": "job"})
        );
    }

    proptest! {
        #[test]
        fn channel_config_matches_any_event_on_channel(
            extra in proptest::collection::btree_map("[a-z_]{1,8}", "[a-z0-9]{0,6}", 0..6)
        ) {
            let config = SubscriptionConfig::new("job", None);
            let mut event: Map<String, Value> = extra
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            let _ = event.insert(CHANNEL_FIELD.into(), json!("job"));
            prop_assert!(config.matches(&event));
        }

        #[test]
        fn integer_filter_matches_only_its_decimal_string(n in 0u64..100_000, m in 0u64..100_000) {
            let mut filter = Map::new();
            let _ = filter.insert("build_number".into(), json!(n));
            let config = SubscriptionConfig::new("job", Some(&filter));
            let mut event = Map::new();
            let _ = event.insert(CHANNEL_FIELD.into(), json!("job"));
            let _ = event.insert("build_number".into(), json!(m.to_string()));
            prop_assert_eq!(config.matches(&event), n == m);
        }

        #[test]
        fn event_always_matches_itself(
            fields in proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,6}", 0..6)
        ) {
            let event: Map<String, Value> = fields
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            prop_assert!(contains_all(&event, &event));
        }
    }
}
