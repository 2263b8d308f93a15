//! The transport seam the client core talks through.

use async_trait::async_trait;
use futures::stream::BoxStream;

use ssegw_core::{ConfigurationRequest, ConnectResponse, SessionInfo};

use crate::errors::Result;
use crate::sse::SseFrame;

/// Frames pushed by the gateway, in delivery order.
pub type FrameStream = BoxStream<'static, SseFrame>;

/// Raw push-stream and control-request transport.
///
/// URLs are fully resolved by the caller; implementations only move bytes.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    /// Whether this host can open push streams at all.
    ///
    /// When `false` the client stays inert: subscriptions are recorded
    /// locally but nothing goes over the network.
    fn supports_push_stream(&self) -> bool {
        true
    }

    /// Control GET against the connect endpoint.
    async fn connect(&self, url: &str) -> Result<ConnectResponse>;

    /// Control POST of a configuration batch.
    ///
    /// Session credentials (crumb header, session cookie) come from `session`.
    async fn configure(
        &self,
        url: &str,
        request: &ConfigurationRequest,
        session: &SessionInfo,
    ) -> Result<()>;

    /// Open the long-lived push stream.
    async fn listen(&self, url: &str) -> Result<FrameStream>;
}
