//! Client error taxonomy.
//!
//! Transport errors are recovered by the reconnect policy and recorded on
//! the connection snapshot; they never unwind past the connection manager.
//! Wire errors drop the offending frame and leave the connection up.

use thiserror::Error;
use vigil_core::WireError;

/// Errors surfaced by the synchronization core.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket-level open/send/close failure.
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// Malformed or unrecognized inbound frame.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The peer rejected the authentication handshake. Not retried: an
    /// expired credential would keep failing, so the operator must
    /// re-authenticate.
    #[error("authentication rejected: {reason}")]
    AuthRejected {
        /// Peer-provided reason, if any.
        reason: String,
    },

    /// A send was attempted while not connected.
    #[error("not connected")]
    NotConnected,
}
