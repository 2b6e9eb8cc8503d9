//! WebSocket upgrade request and response handling.
//!
//! The upgrade is a single HTTP/1.1 exchange. The client sends:
//!
//! ```text
//! GET /ws?token=<token> HTTP/1.1
//! Host: <host>
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Key: <base64 of 16 random bytes>
//! Sec-WebSocket-Version: 13
//! Origin: <origin>
//! ```
//!
//! and the server answers `101 Switching Protocols`. Authentication rides in
//! the query string rather than a header, which is how the service under test
//! authenticates browser WebSocket clients.
//!
//! This module only builds and parses bytes; the I/O lives in the client crate.

use base64::Engine;
use serde::Serialize;

use crate::error::HandshakeError;

/// Ceiling on the size of a handshake response head.
pub const MAX_HANDSHAKE_RESPONSE: usize = 64 * 1024;

/// WebSocket protocol version sent in `Sec-WebSocket-Version`.
pub const WEBSOCKET_VERSION: &str = "13";

/// HTTP status for a successful upgrade.
pub const SWITCHING_PROTOCOLS: u16 = 101;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Serialize)]
struct TokenQuery<'a> {
    token: &'a str,
}

/// An upgrade request for one WebSocket connection.
#[derive(Clone, Debug)]
pub struct HandshakeRequest {
    host: String,
    path: String,
    token: String,
    origin: String,
    key: String,
}

impl HandshakeRequest {
    /// Create a request with a freshly generated `Sec-WebSocket-Key`.
    pub fn new(
        host: impl Into<String>,
        path: impl Into<String>,
        token: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            token: token.into(),
            origin: origin.into(),
            key: generate_key(),
        }
    }

    /// Replace the generated key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Request target: the path with the token appended as a query parameter.
    pub fn target(&self) -> Result<String, HandshakeError> {
        let query = serde_qs::to_string(&TokenQuery { token: &self.token })
            .map_err(|e| HandshakeError::InvalidRequest(e.to_string()))?;
        let separator = if self.path.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}{}", self.path, separator, query))
    }

    /// Render the full request head, terminated by a blank line.
    pub fn encode(&self) -> Result<String, HandshakeError> {
        let target = self.target()?;
        Ok(format!(
            "GET {target} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {key}\r\n\
             Sec-WebSocket-Version: {WEBSOCKET_VERSION}\r\n\
             Origin: {origin}\r\n\
             \r\n",
            host = self.host,
            key = self.key,
            origin = self.origin,
        ))
    }
}

/// Generate a `Sec-WebSocket-Key`: 16 random bytes, standard base64.
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    base64::engine::general_purpose::STANDARD.encode(nonce)
}

/// Position just past the first `\r\n\r\n` in `data`, if present.
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
        .map(|pos| pos + HEADER_TERMINATOR.len())
}

/// A parsed HTTP response head.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    /// Header pairs with lowercase names, in arrival order.
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Accept only `101 Switching Protocols`.
    pub fn ensure_switching_protocols(&self) -> Result<(), HandshakeError> {
        if self.status == SWITCHING_PROTOCOLS {
            Ok(())
        } else {
            Err(HandshakeError::Rejected {
                status: self.status,
                reason: self.reason.clone(),
            })
        }
    }
}

/// Parse a response head (status line plus headers).
///
/// `head` may include the trailing blank line.
pub fn parse_response_head(head: &[u8]) -> Result<ResponseHead, HandshakeError> {
    let text = std::str::from_utf8(head)
        .map_err(|_| HandshakeError::Malformed("response head is not valid UTF-8".into()))?;
    let mut lines = text.split("\r\n");

    let status_line = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| HandshakeError::Malformed("missing status line".into()))?;

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(HandshakeError::Malformed(format!(
            "unexpected status line: {status_line:?}"
        )));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            HandshakeError::Malformed(format!("invalid status code in {status_line:?}"))
        })?;
    let reason = parts.next().unwrap_or_default().trim().to_string();

    let mut headers = Vec::new();
    for line in lines.take_while(|line| !line.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HandshakeError::Malformed(format!("invalid header line: {line:?}")))?;
        headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
    }

    Ok(ResponseHead {
        status,
        reason,
        headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_request_carries_token_in_query() {
        let request = HandshakeRequest::new("127.0.0.1:9091", "/ws", "deadbeef", "tt-app://local.ui")
            .with_key("dGhlIHNhbXBsZSBub25jZQ==");
        let encoded = request.encode().unwrap();

        assert!(encoded.starts_with("GET /ws?token=deadbeef HTTP/1.1\r\n"));
        assert!(encoded.contains("Host: 127.0.0.1:9091\r\n"));
        assert!(encoded.contains("Upgrade: websocket\r\n"));
        assert!(encoded.contains("Connection: Upgrade\r\n"));
        assert!(encoded.contains("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n"));
        assert!(encoded.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(encoded.contains("Origin: tt-app://local.ui\r\n"));
        assert!(encoded.ends_with("\r\n\r\n"));
        assert!(!encoded.to_ascii_lowercase().contains("x-tt-auth"));
    }

    #[test]
    fn test_target_escapes_token() {
        let request = HandshakeRequest::new("h", "/ws", "ab&cd", "o");
        assert_eq!(request.target().unwrap(), "/ws?token=ab%26cd");
    }

    #[test]
    fn test_generated_key_is_sixteen_random_bytes() {
        let key = generate_key();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&key)
            .unwrap();

        assert_eq!(decoded.len(), 16);
        assert_ne!(generate_key(), key);
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"HTTP/1.1 101 OK\r\n\r\n"), Some(19));
        assert_eq!(find_header_end(b"HTTP/1.1 101 OK\r\n\r\n\x81\x00"), Some(19));
        assert_eq!(find_header_end(b"HTTP/1.1 101 OK\r\n"), None);
    }

    #[test]
    fn test_parse_switching_protocols() {
        let head = b"HTTP/1.1 101 Switching Protocols\r\n\
                     Upgrade: websocket\r\n\
                     Connection: Upgrade\r\n\
                     Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";
        let parsed = parse_response_head(head).unwrap();

        assert_eq!(parsed.status, 101);
        assert_eq!(parsed.reason, "Switching Protocols");
        assert_eq!(parsed.header("UPGRADE"), Some("websocket"));
        assert!(parsed.ensure_switching_protocols().is_ok());
    }

    #[test]
    fn test_non_upgrade_status_rejected() {
        let parsed = parse_response_head(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n").unwrap();

        assert_eq!(
            parsed.ensure_switching_protocols(),
            Err(HandshakeError::Rejected {
                status: 403,
                reason: "Forbidden".into(),
            })
        );
    }

    #[test]
    fn test_malformed_heads() {
        assert!(matches!(
            parse_response_head(b"\r\n\r\n"),
            Err(HandshakeError::Malformed(_))
        ));
        assert!(matches!(
            parse_response_head(b"SSH-2.0-OpenSSH\r\n\r\n"),
            Err(HandshakeError::Malformed(_))
        ));
        assert!(matches!(
            parse_response_head(b"HTTP/1.1 abc\r\n\r\n"),
            Err(HandshakeError::Malformed(_))
        ));
        assert!(matches!(
            parse_response_head(b"HTTP/1.1 101 OK\r\nno-colon\r\n\r\n"),
            Err(HandshakeError::Malformed(_))
        ));
    }
}
