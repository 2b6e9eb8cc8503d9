//! Protocol error types.
//!
//! - [`FrameError`]: malformed or incomplete WebSocket frames
//! - [`HandshakeError`]: failed HTTP upgrade negotiation

/// Errors raised while decoding WebSocket frames.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The byte source ended before a complete frame was read.
    ///
    /// `expected` is the full frame length when the header was already
    /// decodable, `None` when even the header was incomplete.
    #[error("frame truncated: {available} bytes buffered, expected {expected:?}")]
    Truncated {
        expected: Option<u64>,
        available: usize,
    },

    /// RSV1-3 bits were set but no extension was negotiated.
    #[error("reserved bits set in frame header: 0x{0:02x}")]
    ReservedBits(u8),

    /// Opcode outside the set defined by RFC 6455.
    #[error("unknown opcode: 0x{0:x}")]
    UnknownOpcode(u8),

    /// A control frame arrived without FIN set.
    #[error("fragmented control frame")]
    FragmentedControl,

    /// A control frame declared more than 125 payload bytes.
    #[error("control frame payload too large: {0} bytes")]
    ControlTooLarge(u64),

    /// A continuation frame arrived with no fragmented message in progress,
    /// or a new data frame interrupted one.
    #[error("unexpected {0} frame in fragmented message sequence")]
    UnexpectedFragment(&'static str),

    /// The declared payload length exceeds the configured maximum.
    #[error("frame payload of {len} bytes exceeds limit of {max}")]
    TooLarge { len: u64, max: usize },
}

/// Errors raised while negotiating the WebSocket upgrade.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// The response head is longer than the size ceiling.
    #[error("handshake response head exceeded {limit} bytes")]
    Oversized { limit: usize },

    /// The response head could not be parsed.
    #[error("malformed handshake response: {0}")]
    Malformed(String),

    /// The server answered with something other than `101 Switching Protocols`.
    #[error("upgrade rejected with status {status} {reason}")]
    Rejected { status: u16, reason: String },

    /// The connection closed before the response head was complete.
    #[error("connection closed during handshake after {received} bytes")]
    Closed { received: usize },

    /// The request target could not be built.
    #[error("invalid handshake request: {0}")]
    InvalidRequest(String),
}
