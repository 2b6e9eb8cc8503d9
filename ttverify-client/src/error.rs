//! Client-side error types.
//!
//! This module provides [`ClientError`], the error type for RPC calls and
//! WebSocket streams.

use ttverify_core::{FrameError, HandshakeError};

/// Errors from the RPC and streaming clients.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error (connect refused, reset, HTTP failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not complete before its deadline.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The request could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// The WebSocket upgrade failed.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// A frame on the stream violated the framing rules.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The peer closed the stream, either with a Close frame or by EOF.
    #[error("channel closed{}", describe_close(.code, .reason))]
    ChannelClosed {
        code: Option<u16>,
        reason: Option<String>,
    },
}

impl ClientError {
    pub(crate) fn transport(context: &str, err: impl std::fmt::Display) -> Self {
        ClientError::Transport(format!("{context}: {err}"))
    }
}

fn describe_close(code: &Option<u16>, reason: &Option<String>) -> String {
    match (code, reason) {
        (Some(code), Some(reason)) => format!(" with code {code}: {reason}"),
        (Some(code), None) => format!(" with code {code}"),
        (None, _) => String::new(),
    }
}
