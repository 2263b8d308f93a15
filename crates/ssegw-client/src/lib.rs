//! # ssegw-client
//!
//! Keeps a server-side event dispatcher's subscriptions in step with the
//! subscriptions registered locally:
//!
//! - [`ConnectionManager`]: shared transport, host and settings, plus the
//!   registry of live connections by client id
//! - [`Connection`]: connect and disconnect, subscribe and unsubscribe,
//!   push-stream routing
//! - [`ConfigurationBatcher`]: debounced subscribe/unsubscribe deltas with
//!   per-batch ack listeners
//! - [`SubscriptionRegistry`]: live subscriptions and channel listeners
//!
//! Subscriptions may be registered before connecting; they are sent once
//! the gateway reports a session on the push stream.

#![deny(unsafe_code)]

pub mod batcher;
pub mod callbacks;
pub mod connection;
pub mod endpoints;
pub mod errors;
pub mod manager;
pub mod registry;
pub mod request;
pub mod scheduler;

pub use batcher::ConfigurationBatcher;
pub use callbacks::{AckListener, EventCallback, OnConnect};
pub use connection::Connection;
pub use errors::{ClientError, Result};
pub use manager::{ConnectConfig, ConnectionManager, ConnectionManagerBuilder};
pub use registry::{Deliveries, Subscription, SubscriptionRegistry};
pub use request::{SubscribeArg, SubscribeRequest, SubscribeRequestBuilder};
pub use scheduler::{DebounceTimer, ScheduledTask, TaskScheduler, TokioScheduler};
