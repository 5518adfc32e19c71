//! # vigil-client
//!
//! The realtime synchronization core of the Vigil operator console.
//!
//! A persistent WebSocket connection to a remote assistant process carries
//! two classes of traffic: direct chat turns (in-band) and a side-channel
//! of asynchronous lifecycle events (out-of-band). This crate owns the
//! socket lifecycle and the client-side state machines that consume those
//! events, and publishes derived, always-consistent snapshots for a
//! presentation layer to read:
//!
//! - [`connection`]: socket lifecycle, auth handshake, reconnect backoff
//! - [`router`]: frame classification and per-namespace dispatch
//! - [`conversation`]: the ordered chat log
//! - [`plan`]: pending approval, active plan, bounded history
//! - [`interaction`]: the single live human-in-the-loop question
//! - [`telemetry`]: rolling counters and bounded logs
//! - [`client`]: the composition root that wires one instance of each
//!
//! Everything is event-driven: socket callbacks and timers run as discrete
//! tasks on the tokio runtime, and all cross-component communication goes
//! through channels or snapshot watches — no ambient globals.

#![deny(unsafe_code)]

pub mod client;
pub mod connection;
pub mod conversation;
pub mod errors;
pub mod interaction;
pub mod plan;
pub mod router;
pub mod telemetry;

pub use client::VigilClient;
pub use connection::{ConnectionFailure, ConnectionInfo, ConnectionManager, ConnectionState};
pub use errors::ClientError;
