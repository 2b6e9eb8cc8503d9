//! Protocol types for the TinyTorrent acceptance harness.
//!
//! This crate holds the byte-level pieces shared by the harness clients and
//! their tests. It performs no I/O.
//!
//! ## Modules
//!
//! - [`error`]: Frame and handshake error types
//! - [`frame`]: WebSocket frame encoding, decoding and masking
//! - [`handshake`]: WebSocket upgrade request building and response parsing

mod error;
mod frame;
mod handshake;

pub use error::*;
pub use frame::*;
pub use handshake::*;
