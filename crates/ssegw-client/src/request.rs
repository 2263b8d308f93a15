//! Subscribe requests.
//!
//! The structured form is [`SubscribeRequest`], built directly or through
//! [`SubscribeRequestBuilder`]. [`SubscribeRequest::from_args`] accepts the
//! loose positional form (channel, filter and callback in any order) and
//! normalizes it.

use ssegw_core::{ChannelEvent, Filter};

use crate::callbacks::{AckListener, EventCallback};
use crate::errors::{ClientError, Result};

/// A validated subscription request.
pub struct SubscribeRequest {
    pub(crate) channel: String,
    pub(crate) filter: Option<Filter>,
    pub(crate) callback: EventCallback,
    pub(crate) on_subscribed: Option<AckListener>,
}

impl SubscribeRequest {
    /// Subscribe `callback` to every event on `channel`.
    pub fn new(channel: impl Into<String>, callback: EventCallback) -> Self {
        Self {
            channel: channel.into(),
            filter: None,
            callback,
            on_subscribed: None,
        }
    }

    /// Start a builder.
    pub fn builder() -> SubscribeRequestBuilder {
        SubscribeRequestBuilder::default()
    }

    /// Narrow the subscription with `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Fire `listener` once the server acknowledges the batch carrying this subscription.
    #[must_use]
    pub fn on_subscribed(mut self, listener: impl FnOnce() + Send + 'static) -> Self {
        self.on_subscribed = Some(Box::new(listener));
        self
    }

    /// Normalize positional arguments. The first argument of each kind wins.
    pub fn from_args(args: impl IntoIterator<Item = SubscribeArg>) -> Result<Self> {
        let mut builder = Self::builder();
        for arg in args {
            match arg {
                SubscribeArg::Channel(channel) if builder.channel.is_none() => {
                    builder.channel = Some(channel);
                }
                SubscribeArg::Filter(filter) if builder.filter.is_none() => {
                    builder.filter = Some(filter);
                }
                SubscribeArg::Callback(callback) if builder.callback.is_none() => {
                    builder.callback = Some(callback);
                }
                _ => {}
            }
        }
        builder.build()
    }

    /// The requested channel.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The callback, for a later unsubscribe.
    pub fn callback(&self) -> &EventCallback {
        &self.callback
    }
}

impl std::fmt::Debug for SubscribeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscribeRequest")
            .field("channel", &self.channel)
            .field("filter", &self.filter)
            .field("callback", &self.callback)
            .field("on_subscribed", &self.on_subscribed.is_some())
            .finish()
    }
}

/// Builder for [`SubscribeRequest`].
#[derive(Default)]
pub struct SubscribeRequestBuilder {
    channel: Option<String>,
    filter: Option<Filter>,
    callback: Option<EventCallback>,
    on_subscribed: Option<AckListener>,
}

impl SubscribeRequestBuilder {
    /// Set the channel.
    #[must_use]
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Set the filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the event callback from a closure.
    #[must_use]
    pub fn on_event(self, f: impl Fn(ChannelEvent) + Send + Sync + 'static) -> Self {
        self.callback(EventCallback::new(f))
    }

    /// Set the event callback, keeping its identity for a later unsubscribe.
    #[must_use]
    pub fn callback(mut self, callback: EventCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Set the subscribed-ack listener.
    #[must_use]
    pub fn on_subscribed(mut self, listener: impl FnOnce() + Send + 'static) -> Self {
        self.on_subscribed = Some(Box::new(listener));
        self
    }

    /// Validate and build. A channel and a callback are required.
    pub fn build(self) -> Result<SubscribeRequest> {
        let channel = self
            .channel
            .filter(|c| !c.is_empty())
            .ok_or(ClientError::MissingChannel)?;
        let callback = self.callback.ok_or(ClientError::MissingCallback)?;
        Ok(SubscribeRequest {
            channel,
            filter: self.filter,
            callback,
            on_subscribed: self.on_subscribed,
        })
    }
}

/// One positional subscribe argument.
pub enum SubscribeArg {
    /// Channel name.
    Channel(String),
    /// Event filter.
    Filter(Filter),
    /// Event callback.
    Callback(EventCallback),
}

impl From<&str> for SubscribeArg {
    fn from(channel: &str) -> Self {
        Self::Channel(channel.to_owned())
    }
}

impl From<String> for SubscribeArg {
    fn from(channel: String) -> Self {
        Self::Channel(channel)
    }
}

impl From<Filter> for SubscribeArg {
    fn from(filter: Filter) -> Self {
        Self::Filter(filter)
    }
}

impl From<EventCallback> for SubscribeArg {
    fn from(callback: EventCallback) -> Self {
        Self::Callback(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn filter(value: serde_json::Value) -> Filter {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn builder_requires_channel() {
        let result = SubscribeRequest::builder().on_event(|_| {}).build();
        assert_matches!(result, Err(ClientError::MissingChannel));
    }

    #[test]
    fn builder_rejects_empty_channel() {
        let result = SubscribeRequest::builder()
            .channel("")
            .on_event(|_| {})
            .build();
        assert_matches!(result, Err(ClientError::MissingChannel));
    }

    #[test]
    fn builder_requires_callback() {
        let result = SubscribeRequest::builder().channel("job").build();
        assert_matches!(result, Err(ClientError::MissingCallback));
    }

    #[test]
    fn builder_full() {
        let request = SubscribeRequest::builder()
            .channel("job")
            .filter(filter(json!({"job_name": "a"})))
            .on_event(|_| {})
            .on_subscribed(|| {})
            .build()
            .unwrap();
        assert_eq!(request.channel(), "job");
        assert_eq!(request.filter.as_ref().unwrap()["job_name"], "a");
        assert!(request.on_subscribed.is_some());
    }

    #[test]
    fn positional_any_order() {
        let callback = EventCallback::new(|_| {});
        let request = SubscribeRequest::from_args([
            SubscribeArg::from(filter(json!({"build_number": 3}))),
            SubscribeArg::from(callback.clone()),
            SubscribeArg::from("pipeline"),
        ])
        .unwrap();
        assert_eq!(request.channel(), "pipeline");
        assert_eq!(request.callback(), &callback);
        assert!(request.filter.is_some());
    }

    #[test]
    fn positional_first_of_each_kind_wins() {
        let request = SubscribeRequest::from_args([
            SubscribeArg::from("job"),
            SubscribeArg::from("pipeline"),
            SubscribeArg::from(EventCallback::new(|_| {})),
        ])
        .unwrap();
        assert_eq!(request.channel(), "job");
    }

    #[test]
    fn positional_missing_callback() {
        let result = SubscribeRequest::from_args([SubscribeArg::from("job")]);
        assert_matches!(result, Err(ClientError::MissingCallback));
    }

    #[test]
    fn positional_missing_channel() {
        let result = SubscribeRequest::from_args([SubscribeArg::from(EventCallback::new(|_| {}))]);
        assert_matches!(result, Err(ClientError::MissingChannel));
    }
}
