//! WebSocket streaming client.
//!
//! This module provides [`StreamingClient`], a minimal RFC 6455 client built
//! directly on [`ttverify_core`]'s frame codec. It exists to observe the
//! service's push channel exactly as it appears on the wire, so it performs
//! no reconnection, no extension negotiation and no buffering beyond what a
//! single frame needs.
//!
//! # Control traffic
//!
//! [`StreamingClient::next_message`] answers pings with masked pongs and
//! reports a Close frame as [`ClientError::ChannelClosed`]. Use
//! [`StreamingClient::read_frame`] to see every frame unfiltered.
//!
//! # Example
//!
//! ```ignore
//! use ttverify_client::{StreamOptions, StreamingClient};
//!
//! let options = StreamOptions::new("127.0.0.1", port, secret);
//! let mut client = StreamingClient::connect(&options).await?;
//! let message = client.next_message().await?;
//! println!("{}", message.as_text()?);
//! client.close().await?;
//! ```

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use ttverify_core::{
    DEFAULT_MAX_FRAME_SIZE, Frame, FrameError, HandshakeRequest, Opcode, decode_frame,
    encode_frame, truncated,
};

use crate::ClientError;
use crate::handshake::upgrade;
use crate::rpc::DEFAULT_ORIGIN;

/// Path of the service's push channel.
pub const WS_PATH: &str = "/ws";

/// Normal closure status code.
const CLOSE_NORMAL: u16 = 1000;

/// Connection parameters for [`StreamingClient::connect`].
#[derive(Clone, Debug)]
pub struct StreamOptions {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub token: String,
    pub origin: String,
    pub max_frame_size: usize,
}

impl StreamOptions {
    /// Options for `/ws` on `host:port` with the default origin.
    pub fn new(host: impl Into<String>, port: u16, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            path: WS_PATH.to_string(),
            token: token.into(),
            origin: DEFAULT_ORIGIN.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    fn request(&self) -> HandshakeRequest {
        HandshakeRequest::new(
            format!("{}:{}", self.host, self.port),
            self.path.clone(),
            self.token.clone(),
            self.origin.clone(),
        )
    }
}

/// A complete data message received from the server.
///
/// Fragmented messages are reassembled before they are returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFrame {
    pub payload: Bytes,
    /// `true` for text messages, `false` for binary ones.
    pub text: bool,
}

impl StreamFrame {
    pub fn as_text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.payload)
    }

    /// Decode the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// A connected WebSocket client.
pub struct StreamingClient<S = TcpStream> {
    stream: S,
    buffer: BytesMut,
    max_frame_size: usize,
    fragment: Option<(bool, BytesMut)>,
    closed: bool,
}

impl StreamingClient<TcpStream> {
    /// Connect over TCP and perform the upgrade handshake.
    pub async fn connect(options: &StreamOptions) -> Result<Self, ClientError> {
        let stream = TcpStream::connect((options.host.as_str(), options.port))
            .await
            .map_err(|e| {
                ClientError::transport(
                    &format!("connecting to {}:{}", options.host, options.port),
                    e,
                )
            })?;
        stream
            .set_nodelay(true)
            .map_err(|e| ClientError::transport("configuring socket", e))?;

        Self::handshake(stream, &options.request(), options.max_frame_size).await
    }
}

impl<S> StreamingClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Upgrade an already connected stream.
    pub async fn handshake(
        mut stream: S,
        request: &HandshakeRequest,
        max_frame_size: usize,
    ) -> Result<Self, ClientError> {
        let buffer = upgrade(&mut stream, request).await?;
        Ok(Self {
            stream,
            buffer,
            max_frame_size,
            fragment: None,
            closed: false,
        })
    }

    /// Whether the channel has been closed by either side.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read the next raw frame, control frames included.
    ///
    /// A clean EOF between frames is [`ClientError::ChannelClosed`]; EOF in
    /// the middle of a frame is [`FrameError::Truncated`].
    pub async fn read_frame(&mut self) -> Result<Frame, ClientError> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buffer, self.max_frame_size)? {
                return Ok(frame);
            }

            let read = self
                .stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(|e| ClientError::transport("reading frame", e))?;
            if read == 0 {
                self.closed = true;
                if self.buffer.is_empty() {
                    return Err(ClientError::ChannelClosed {
                        code: None,
                        reason: None,
                    });
                }
                return Err(truncated(&self.buffer).into());
            }
        }
    }

    /// Read the next complete data message.
    ///
    /// Pings are answered, pongs are dropped, and a Close frame is echoed and
    /// returned as [`ClientError::ChannelClosed`].
    pub async fn next_message(&mut self) -> Result<StreamFrame, ClientError> {
        loop {
            let frame = self.read_frame().await?;
            match frame.opcode {
                Opcode::Text | Opcode::Binary => {
                    if self.fragment.is_some() {
                        return Err(FrameError::UnexpectedFragment("data").into());
                    }
                    let text = frame.opcode == Opcode::Text;
                    if frame.fin {
                        return Ok(StreamFrame {
                            payload: frame.payload,
                            text,
                        });
                    }
                    self.fragment = Some((text, BytesMut::from(&frame.payload[..])));
                }
                Opcode::Continuation => {
                    let Some((text, mut assembled)) = self.fragment.take() else {
                        return Err(FrameError::UnexpectedFragment("continuation").into());
                    };
                    if assembled.len() + frame.payload.len() > self.max_frame_size {
                        return Err(FrameError::TooLarge {
                            len: (assembled.len() + frame.payload.len()) as u64,
                            max: self.max_frame_size,
                        }
                        .into());
                    }
                    assembled.extend_from_slice(&frame.payload);
                    if frame.fin {
                        return Ok(StreamFrame {
                            payload: assembled.freeze(),
                            text,
                        });
                    }
                    self.fragment = Some((text, assembled));
                }
                Opcode::Ping => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(len = frame.payload.len(), "answering ping");
                    self.send(&Frame::pong(frame.payload)).await?;
                }
                Opcode::Pong => {}
                Opcode::Close => {
                    let code = frame.close_code();
                    let reason = frame.close_reason().map(str::to_string);
                    if !self.closed {
                        // Echo the close; the peer may already be gone.
                        let _ = self
                            .send(&Frame::close(code.unwrap_or(CLOSE_NORMAL), ""))
                            .await;
                        self.closed = true;
                    }
                    return Err(ClientError::ChannelClosed { code, reason });
                }
            }
        }
    }

    /// Send a frame, masked with a fresh random key.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), ClientError> {
        let key: [u8; 4] = rand::random();
        let encoded = encode_frame(frame, Some(key));
        self.stream
            .write_all(&encoded)
            .await
            .map_err(|e| ClientError::transport("writing frame", e))?;
        self.stream
            .flush()
            .await
            .map_err(|e| ClientError::transport("writing frame", e))
    }

    /// Send a normal Close frame and shut down the write half.
    ///
    /// Calling this more than once, or after the peer closed, is a no-op.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.send(&Frame::close(CLOSE_NORMAL, "")).await?;
        self.stream
            .shutdown()
            .await
            .map_err(|e| ClientError::transport("closing stream", e))
    }
}
