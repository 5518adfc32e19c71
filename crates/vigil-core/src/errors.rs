//! Wire-level errors.
//!
//! Note the deliberate absence of a "domain mismatch" variant: an event
//! referencing an unknown plan/step/interaction ID is presumed stale from a
//! previous connection epoch and discarded as a silent no-op (debug log),
//! never surfaced as an error.

use thiserror::Error;

/// Errors produced while parsing inbound frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The frame was not valid JSON or had the wrong shape for its type.
    #[error("malformed frame: {detail}")]
    Malformed {
        /// What failed to parse.
        detail: String,
    },

    /// An out-of-band event name this client has no handler for.
    #[error("unknown event: {event}")]
    UnknownEvent {
        /// The full dotted event name.
        event: String,
    },
}
