//! HTTP transport using `reqwest`.
//!
//! Control requests carry a per-request timeout; the push stream does not
//! (it is expected to stay open). When the push stream drops, it is reopened
//! after the reconnect delay (or the server's `retry:` hint), sending
//! `Last-Event-ID` if the server assigned ids. An HTTP error status or
//! `204 No Content` on reopen ends the stream for good.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, COOKIE};
use tracing::{debug, info, instrument, warn};

use ssegw_core::{ConfigurationRequest, ConnectResponse, SessionInfo};
use ssegw_settings::ClientSettings;

use crate::errors::{Result, TransportError};
use crate::sse::{SseEvent, parse_sse_events};
use crate::traits::{FrameStream, GatewayTransport};

/// `Last-Event-ID` request header.
const LAST_EVENT_ID: &str = "Last-Event-ID";

const USER_AGENT: &str = concat!("ssegw/", env!("CARGO_PKG_VERSION"));

/// Gateway transport backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    request_timeout: Duration,
    reconnect_delay: Duration,
}

impl ReqwestTransport {
    /// Create a transport with explicit timings.
    ///
    /// If the configured client cannot be built, a default `reqwest` client is
    /// used and a warning is logged. Control requests keep their per-request
    /// timeout either way.
    pub fn new(request_timeout: Duration, reconnect_delay: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build configured HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self {
            client,
            request_timeout,
            reconnect_delay,
        }
    }

    /// Create a transport from client settings.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(settings.request_timeout(), settings.reconnect_delay())
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::from_settings(&ClientSettings::default())
    }
}

/// Fail with the response body when the status is not 2xx.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn open_stream(
    client: &reqwest::Client,
    url: &str,
    last_event_id: Option<&str>,
) -> Result<reqwest::Response> {
    let mut request = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache");
    if let Some(id) = last_event_id {
        request = request.header(LAST_EVENT_ID, id);
    }
    check_status(request.send().await?).await
}

#[async_trait]
impl GatewayTransport for ReqwestTransport {
    #[instrument(skip(self))]
    async fn connect(&self, url: &str) -> Result<ConnectResponse> {
        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        if body.trim().is_empty() {
            return Ok(ConnectResponse::default());
        }
        Ok(serde_json::from_str(&body)?)
    }

    #[instrument(skip(self, request, session))]
    async fn configure(
        &self,
        url: &str,
        request: &ConfigurationRequest,
        session: &SessionInfo,
    ) -> Result<()> {
        let mut builder = self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .header(CONTENT_TYPE, "application/json")
            .json(request);
        if let Some(cookie) = session.session_cookie() {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some((name, value)) = session.crumb_header() {
            builder = builder.header(name, value);
        }
        let _ = check_status(builder.send().await?).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn listen(&self, url: &str) -> Result<FrameStream> {
        let first = open_stream(&self.client, url, None).await?;
        let client = self.client.clone();
        let url = url.to_owned();
        let mut retry = self.reconnect_delay;

        let frames = async_stream::stream! {
            let mut response = Some(first);
            let mut last_event_id: Option<String> = None;

            while let Some(current) = response.take() {
                let mut events = Box::pin(parse_sse_events(Box::pin(current.bytes_stream())));
                while let Some(event) = events.next().await {
                    match event {
                        SseEvent::Retry(ms) => retry = Duration::from_millis(ms),
                        SseEvent::Frame(frame) => {
                            if let Some(id) = &frame.id {
                                last_event_id = Some(id.clone());
                            }
                            yield frame;
                        }
                    }
                }

                response = loop {
                    debug!(%url, delay_ms = retry.as_millis() as u64, "push stream dropped, reconnecting");
                    tokio::time::sleep(retry).await;
                    match open_stream(&client, &url, last_event_id.as_deref()).await {
                        Ok(next) if next.status() == StatusCode::NO_CONTENT => {
                            info!(%url, "gateway closed the push stream");
                            break None;
                        }
                        Ok(next) => break Some(next),
                        Err(TransportError::Status { status, body }) => {
                            warn!(%url, status, body = %body, "push stream reconnect refused");
                            break None;
                        }
                        Err(e) => warn!(%url, error = %e, "push stream reconnect failed"),
                    }
                };
            }
        };

        Ok(frames.boxed())
    }
}
