//! # ssegw-transport
//!
//! The I/O boundary of the SSE gateway client:
//!
//! - [`GatewayTransport`]: control GET/POST plus the long-lived push stream
//! - [`ReqwestTransport`]: the HTTP implementation, with EventSource-style
//!   reconnect of the push stream
//! - [`sse`]: the `text/event-stream` frame decoder
//! - [`HostEnvironment`] / [`TabStorage`]: what the embedding host provides
//!   (tab-scoped storage, page root URL, page reload)

#![deny(unsafe_code)]

pub mod errors;
pub mod host;
pub mod http;
pub mod sse;
pub mod traits;

pub use errors::{Result, TransportError};
pub use host::{HeadlessHost, HostEnvironment, MemoryTabStorage, SessionScopedHost, TabStorage};
pub use http::ReqwestTransport;
pub use sse::{SseEvent, SseFrame, parse_sse_events};
pub use traits::{FrameStream, GatewayTransport};
