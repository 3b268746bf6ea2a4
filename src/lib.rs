//! Worker side of the Majordomo Protocol v0.1 (MDPW01).
//!
//! A [`Worker`] registers a named service with a broker over a ZeroMQ
//! DEALER socket, receives REQUEST envelopes for that service, hands
//! the payload to an application [`WorkerAction`], and routes the REPLY
//! back to the originating client through the broker. Liveness is kept
//! up by bidirectional heartbeats; a silent broker triggers a delayed
//! reconnect with a fresh READY handshake.
//!
//! ```no_run
//! use majordomo_worker::{Worker, WorkerConfig, WorkerResult, ZmqTransport};
//!
//! fn main() -> WorkerResult<()> {
//!     let config = WorkerConfig::new("tcp://localhost:5555", "echo");
//!     let mut worker = Worker::new(
//!         ZmqTransport::default(),
//!         config,
//!         |request: Vec<Vec<u8>>| request,
//!     )?;
//!     loop {
//!         let reply = worker.receive()?;
//!         println!("served one request with {} reply frame(s)", reply.len());
//!     }
//! }
//! ```
//!
//! Shutdown comes from another thread through a [`ShutdownHandle`];
//! `receive` then releases the socket and transport context and returns
//! [`WorkerError::Shutdown`].

mod commands;
pub(crate) mod consts;
mod error;
mod shutdown;
mod transport;
mod worker;

pub use commands::Command;
pub use consts::{
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_MAX_LIVENESS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_RECONNECT_DELAY_MS,
};
pub use error::{WorkerError, WorkerResult};
pub use shutdown::ShutdownHandle;
pub use transport::{Transport, TransportSocket, ZmqTransport};
pub use worker::{Worker, WorkerAction, WorkerConfig};
