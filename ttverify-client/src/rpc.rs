//! Single-shot JSON RPC calls.
//!
//! Every call opens a fresh HTTP/1.1 connection, posts
//! `{"method": ..., "arguments": {...}}` to [`RPC_PATH`] and reads the whole
//! response. The session secret travels in the [`AUTH_HEADER`] header and the
//! declared origin in `Origin`; whether the service honours either is for the
//! caller to assert.
//!
//! Response bodies that are not JSON are kept verbatim as [`RpcBody::Raw`]
//! so a failing check can still show what the service said.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, StatusCode, header};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::net::TcpStream;

use crate::ClientError;

/// RPC endpoint path.
pub const RPC_PATH: &str = "/transmission/rpc";

/// Header carrying the session secret.
pub const AUTH_HEADER: &str = "X-TT-Auth";

/// Origin the service's own UI presents.
pub const DEFAULT_ORIGIN: &str = "tt-app://local.ui";

/// Default per-call deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// An RPC request body.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub arguments: Map<String, Value>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            arguments: Map::new(),
        }
    }

    /// Add one argument.
    pub fn argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// A decoded response body.
#[derive(Clone, Debug, PartialEq)]
pub enum RpcBody {
    Json(Value),
    /// The body was not valid JSON; kept as (lossy) UTF-8 text.
    Raw(String),
}

impl RpcBody {
    /// Parse `bytes` as JSON, falling back to raw text.
    pub fn parse(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => RpcBody::Json(value),
            Err(_) => RpcBody::Raw(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

impl std::fmt::Display for RpcBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcBody::Json(value) => write!(f, "{value}"),
            RpcBody::Raw(text) => write!(f, "{text:?}"),
        }
    }
}

/// Transport status plus decoded body.
#[derive(Clone, Debug)]
pub struct RpcResponse {
    pub status: StatusCode,
    pub body: RpcBody,
}

impl RpcResponse {
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            RpcBody::Json(value) => Some(value),
            RpcBody::Raw(_) => None,
        }
    }

    /// The `arguments` object of a JSON response.
    pub fn arguments(&self) -> Option<&Map<String, Value>> {
        self.json()?.get("arguments")?.as_object()
    }

    pub fn argument(&self, key: &str) -> Option<&Value> {
        self.arguments()?.get(key)
    }

    /// Application error code.
    ///
    /// Looks for a numeric `code` inside `arguments` first, then at the top
    /// level. Distinct from the HTTP status.
    pub fn app_code(&self) -> Option<i64> {
        self.argument("code")
            .or_else(|| self.json()?.get("code"))
            .and_then(Value::as_i64)
    }

    /// The top-level `result` string.
    pub fn result(&self) -> Option<&str> {
        self.json()?.get("result")?.as_str()
    }
}

/// Client for the service's RPC endpoint.
#[derive(Clone)]
pub struct RpcClient {
    host: String,
    port: u16,
    secret: String,
    origin: String,
    timeout: Duration,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("origin", &self.origin)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    pub fn new(host: impl Into<String>, port: u16, secret: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            secret: secret.into(),
            origin: DEFAULT_ORIGIN.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the origin sent by [`call`](Self::call).
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Call with the configured origin.
    pub async fn call(&self, request: &RpcRequest) -> Result<RpcResponse, ClientError> {
        self.call_with_origin(request, &self.origin).await
    }

    /// Call with an explicit origin.
    pub async fn call_with_origin(
        &self,
        request: &RpcRequest,
        origin: &str,
    ) -> Result<RpcResponse, ClientError> {
        let response = tokio::time::timeout(self.timeout, self.send(request, origin))
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))??;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            rpc.method = %request.method,
            origin,
            status = response.status.as_u16(),
            "rpc call completed"
        );

        Ok(response)
    }

    async fn send(&self, request: &RpcRequest, origin: &str) -> Result<RpcResponse, ClientError> {
        let body = serde_json::to_vec(request).map_err(|e| ClientError::Encode(e.to_string()))?;

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                ClientError::transport(&format!("connecting to {}:{}", self.host, self.port), e)
            })?;
        let io = TokioIo::new(stream);

        let (mut sender, conn) = http1::handshake(io)
            .await
            .map_err(|e| ClientError::transport("http handshake", e))?;
        tokio::spawn(async move {
            if let Err(_e) = conn.await {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %_e, "rpc connection error");
            }
        });

        let req = Request::builder()
            .method(Method::POST)
            .uri(RPC_PATH)
            .header(header::HOST, format!("{}:{}", self.host, self.port))
            .header(header::CONTENT_TYPE, "application/json")
            .header(AUTH_HEADER, self.secret.as_str())
            .header(header::ORIGIN, origin)
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| ClientError::Encode(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ClientError::transport("sending request", e))?;
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ClientError::transport("reading response body", e))?
            .to_bytes();

        Ok(RpcResponse {
            status,
            body: RpcBody::parse(&bytes),
        })
    }
}
