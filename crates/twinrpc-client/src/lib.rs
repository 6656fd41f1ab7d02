//! # JSON-RPC 1.0/2.0 client call engine
//!
//! Serializes calls and notifications, exchanges them through a pluggable
//! transport, and raises structured failures for faults the peer returns.
//! [`MultiCall`] accumulates a sequence of deferred calls into one batch and
//! demultiplexes the batch response back into per-call results, raising each
//! entry's fault only when that entry is consumed.

pub mod client;
pub mod config;
pub mod error;
pub mod multicall;
pub mod transport;

pub use client::RpcClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use multicall::{MultiCall, MultiCallResults};
pub use transport::{HeaderGuard, HeaderStack, Transport, TransportError};
