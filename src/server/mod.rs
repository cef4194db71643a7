//! Transports that expose the gateway as JSON-RPC 2.0.
//!
//! - [`http`]: `POST /rpc` on an axum router
//! - [`stdio`]: newline-delimited requests on stdin, responses on stdout
//!
//! Both hand each request to the same [`RpcHandler`].

pub mod dispatch;
pub mod http;
pub mod stdio;

pub use dispatch::{RpcHandler, METHODS};
