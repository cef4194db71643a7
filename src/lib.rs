//! Scene Bridge
//!
//! Drives a single-threaded 3D scene from many concurrent JSON-RPC clients.
//!
//! # Architecture
//!
//! - **Gateway** ([`gateway`]): sanitizes scripts, queues tasks and waits for
//!   the correlated response with a per-call timeout.
//! - **Executor** ([`executor`]): the only thread that owns the [`scene::Scene`].
//!   It drains one task per tick and never blocks on work.
//! - **Queues** ([`queue`]): a FIFO of tasks and an id-keyed map of responses.
//! - **Sanitizer** ([`sanitizer`]): static import and call checks on scripts.
//! - **Script** ([`script`]): the Python-like modelling language scripts are
//!   written in.
//! - **Transports** ([`server`]): HTTP and stdio JSON-RPC.

pub mod bridge;
pub mod config;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod queue;
pub mod registry;
pub mod sanitizer;
pub mod scene;
pub mod script;
pub mod server;
pub mod tracker;
pub mod types;

pub use bridge::Bridge;
pub use config::{BridgeConfig, Transport};
pub use error::{BridgeError, Result};
pub use gateway::Gateway;
pub use types::{CallOutcome, ExecutionResponse, OperationResult, TaskId};
