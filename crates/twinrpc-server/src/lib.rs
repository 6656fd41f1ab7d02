//! # JSON-RPC 1.0/2.0 server engine
//!
//! Transport-agnostic dispatch: bytes in, optional bytes out. The engine
//! validates an inbound request (or batch), resolves the method against a
//! flat or namespaced registry, binds parameters against the method's
//! declared contract, invokes the handler, and maps every outcome (unknown
//! method, bad parameters, handler fault, handler panic) to a
//! version-appropriate response. Notifications never produce a response and
//! can be pushed onto a worker pool so the engine returns immediately.
//!
//! Nothing in here is fatal: a single bad call degrades to one fault
//! response.

pub mod config;
pub mod dispatch;
pub mod pool;
pub mod registry;

pub use config::ServerConfig;
pub use dispatch::ProtocolHandler;
pub use pool::{PoolError, PoolTask, WorkerPool};
pub use registry::{BindError, FnHandler, MethodRegistry, ParamSpec, RpcHandler};
