//! WebSocket upgrade over an established byte stream.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use ttverify_core::{
    HandshakeError, HandshakeRequest, MAX_HANDSHAKE_RESPONSE, find_header_end,
    parse_response_head,
};

use crate::ClientError;

const READ_CHUNK: usize = 4096;

/// Perform the upgrade handshake on `stream`.
///
/// Reads until the response head is complete. A head longer than
/// [`MAX_HANDSHAKE_RESPONSE`] bytes, terminator included, is rejected. Bytes received after the head
/// belong to the first frames and are returned so they are not lost.
pub async fn upgrade<S>(stream: &mut S, request: &HandshakeRequest) -> Result<BytesMut, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = request.encode()?;
    stream
        .write_all(head.as_bytes())
        .await
        .map_err(|e| ClientError::transport("sending upgrade request", e))?;
    stream
        .flush()
        .await
        .map_err(|e| ClientError::transport("sending upgrade request", e))?;

    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        if let Some(end) = find_header_end(&buf) {
            if end > MAX_HANDSHAKE_RESPONSE {
                return Err(HandshakeError::Oversized {
                    limit: MAX_HANDSHAKE_RESPONSE,
                }
                .into());
            }
            let response = parse_response_head(&buf[..end])?;
            response.ensure_switching_protocols()?;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                status = response.status,
                buffered = buf.len() - end,
                "websocket upgrade accepted"
            );

            buf.advance(end);
            return Ok(buf);
        }

        if buf.len() > MAX_HANDSHAKE_RESPONSE {
            return Err(HandshakeError::Oversized {
                limit: MAX_HANDSHAKE_RESPONSE,
            }
            .into());
        }

        buf.reserve(READ_CHUNK);
        let read = stream
            .read_buf(&mut buf)
            .await
            .map_err(|e| ClientError::transport("reading upgrade response", e))?;
        if read == 0 {
            return Err(HandshakeError::Closed {
                received: buf.len(),
            }
            .into());
        }
    }
}
