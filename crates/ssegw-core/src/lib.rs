//! # ssegw-core
//!
//! Foundation types shared by every SSE gateway client crate:
//!
//! - **Wire types**: [`SessionInfo`], [`ConnectResponse`], [`ConfigureAck`],
//!   [`ConfigurationRequest`] and the structural frame names
//! - **Filter matching**: [`SubscriptionConfig`] and [`contains_all`]
//! - **Events**: [`ChannelEvent`], the decoded payload of a channel frame
//! - **Ids**: [`ClientId`], [`TabClientId`] and tab-affinity id minting
//! - **Logging**: subscriber setup and a log-capture layer for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod event;
pub mod filter;
pub mod ids;
pub mod logging;
pub mod wire;

pub use errors::{Result, WireError};
pub use event::ChannelEvent;
pub use filter::{Filter, SubscriptionConfig, coerce_to_string, contains_all};
pub use ids::{ClientId, TabClientId, mint_tab_client_id, tab_storage_key};
pub use wire::{
    CHANNEL_FIELD, CONFIGURE_FRAME, ConfigurationRequest, ConfigureAck, ConnectResponse, Crumb,
    EVENT_FIELD, OPEN_FRAME, RELOAD_FRAME, SessionInfo,
};
