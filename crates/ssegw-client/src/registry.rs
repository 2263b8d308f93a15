//! Live subscriptions and channel listener bookkeeping.
//!
//! The registry owns the subscription list (config plus callback) and the
//! set of channels that have a push-stream listener. Listener names
//! requested before the push stream exists wait in a queue until connect.

use std::collections::HashSet;

use ssegw_core::{ChannelEvent, Filter, SubscriptionConfig, WireError};

use crate::callbacks::EventCallback;

/// One live subscription.
#[derive(Clone, Debug)]
pub struct Subscription {
    /// Filter plus channel.
    pub config: SubscriptionConfig,
    /// Delivery target.
    pub callback: EventCallback,
}

/// Result of matching one channel frame against the registry.
#[derive(Debug, Default)]
pub struct Deliveries {
    /// Subscriptions on the frame's channel.
    pub candidates: usize,
    /// Matching callbacks, each with its own copy of the event.
    pub matched: Vec<(EventCallback, ChannelEvent)>,
}

/// Subscription list and channel listener map.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: Vec<Subscription>,
    channel_listeners: HashSet<String>,
    listener_queue: Vec<String>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscription and return its config.
    pub fn add(&mut self, channel: &str, filter: Option<&Filter>, callback: EventCallback) -> SubscriptionConfig {
        let config = SubscriptionConfig::new(channel, filter);
        self.subscriptions.push(Subscription {
            config: config.clone(),
            callback,
        });
        config
    }

    /// Remove every subscription registered with `callback`, returning their configs.
    ///
    /// Channel listeners are left in place.
    pub fn remove(&mut self, callback: &EventCallback) -> Vec<SubscriptionConfig> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.subscriptions)
            .into_iter()
            .partition(|s| s.callback.same_as(callback));
        self.subscriptions = kept;
        removed.into_iter().map(|s| s.config).collect()
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether there are no live subscriptions.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Number of live subscriptions on `channel`.
    pub fn channel_len(&self, channel: &str) -> usize {
        self.on_channel(channel).count()
    }

    /// Whether `channel` has a listener recorded.
    pub fn has_channel_listener(&self, channel: &str) -> bool {
        self.channel_listeners.contains(channel)
    }

    /// Record a listener for `channel`. Returns `false` if one already exists.
    pub fn claim_channel_listener(&mut self, channel: &str) -> bool {
        self.channel_listeners.insert(channel.to_owned())
    }

    /// Defer attaching the listener for `channel` until the push stream opens.
    pub fn queue_listener(&mut self, channel: &str) {
        self.listener_queue.push(channel.to_owned());
    }

    /// Take the channels waiting for a push stream.
    pub fn take_listener_queue(&mut self) -> Vec<String> {
        std::mem::take(&mut self.listener_queue)
    }

    /// Clear the listener map, returning the channels it held.
    pub fn drain_channel_listeners(&mut self) -> Vec<String> {
        self.channel_listeners.drain().collect()
    }

    /// Match a channel frame payload against the subscriptions on `channel`.
    pub fn deliveries(&self, channel: &str, data: &str) -> Result<Deliveries, WireError> {
        let candidates: Vec<&Subscription> = self.on_channel(channel).collect();
        let mut deliveries = Deliveries {
            candidates: candidates.len(),
            matched: Vec::new(),
        };
        if candidates.is_empty() {
            return Ok(deliveries);
        }
        let event = ChannelEvent::parse(data)?;
        for subscription in candidates {
            if event.matches(&subscription.config) {
                deliveries
                    .matched
                    .push((subscription.callback.clone(), event.clone()));
            }
        }
        Ok(deliveries)
    }

    fn on_channel<'a>(&'a self, channel: &'a str) -> impl Iterator<Item = &'a Subscription> + 'a {
        self.subscriptions
            .iter()
            .filter(move |s| s.config.channel() == Some(channel))
    }
}
