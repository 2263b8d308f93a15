//! Client error types.
//!
//! Usage errors (`MissingChannel`, `MissingCallback`, `AlreadyConnected`,
//! `ObsoleteBatch`) signal caller or sequencing mistakes and are returned
//! immediately. Network failures during connect surface as `Transport`;
//! failures of configuration POSTs are only logged.

use thiserror::Error;

use ssegw_core::ClientId;
use ssegw_transport::TransportError;

/// Errors returned by the subscription engine.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A subscribe request named no channel.
    #[error("no channel name provided")]
    MissingChannel,
    /// A subscribe request carried no event callback.
    #[error("no event callback provided")]
    MissingCallback,
    /// Another live connection already uses this client id.
    #[error("a connection for client id '{client_id}' already exists; disconnect it first")]
    AlreadyConnected {
        /// The contested client id.
        client_id: ClientId,
    },
    /// An ack listener targeted a batch that no longer accepts listeners.
    #[error("ack listener registered for obsolete batch {batch_id}")]
    ObsoleteBatch {
        /// The current batch id at registration time.
        batch_id: u64,
    },
    /// Connect-time transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
