//! Clients for the TinyTorrent acceptance harness.
//!
//! This crate talks to a running service over its two surfaces:
//!
//! - [`RpcClient`]: JSON requests to `/transmission/rpc`, authenticated with
//!   the `X-TT-Auth` header
//! - [`StreamingClient`]: the `/ws` WebSocket channel, authenticated with a
//!   `token` query parameter
//!
//! ## Example
//!
//! ```ignore
//! use ttverify_client::{RpcClient, RpcRequest, StreamOptions, StreamingClient};
//!
//! let rpc = RpcClient::new("127.0.0.1", port, &secret);
//! let response = rpc.call(&RpcRequest::new("tt-get-capabilities")).await?;
//! println!("{}", response.body);
//!
//! let mut stream = StreamingClient::connect(&StreamOptions::new("127.0.0.1", port, &secret)).await?;
//! let message = stream.next_message().await?;
//! println!("{}", message.as_text()?);
//! ```
//!
//! ## Features
//!
//! - `tracing`: emit debug events for calls, upgrades and stream traffic

mod error;
pub mod handshake;
pub mod rpc;
pub mod streaming;

pub use error::ClientError;
pub use handshake::upgrade;
pub use rpc::{
    AUTH_HEADER, DEFAULT_ORIGIN, DEFAULT_TIMEOUT, RPC_PATH, RpcBody, RpcClient, RpcRequest,
    RpcResponse,
};
pub use streaming::{StreamFrame, StreamOptions, StreamingClient, WS_PATH};

// Re-export the protocol crate for callers that build frames by hand.
pub use ttverify_core as core;
