//! In-process stand-in for the service, for scenario tests.
//!
//! Serves `/transmission/rpc` and `/ws` on an ephemeral port with hyper's
//! HTTP/1 server. Behaviour is driven by [`FakeServiceConfig`]; the defaults
//! conform to every scenario.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::{Bytes, BytesMut};
use http::{Method, Request, Response, StatusCode, header};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use ttverify_client::{AUTH_HEADER, DEFAULT_ORIGIN, RPC_PATH, WS_PATH};
use ttverify_core::{Frame, Opcode, decode_frame, encode_frame, parse_frame_header};

use crate::secret::ServiceSecret;

const PROTOCOL_ERROR: u16 = 1002;

#[derive(Clone, Debug)]
pub(crate) struct FakeServiceConfig {
    pub version: String,
    pub class: String,
    pub enforce_origin: bool,
    /// `arguments.code` for a missing metainfo file; `None` omits it.
    pub missing_file_code: Option<i64>,
    pub bad_path_code: i64,
    /// Text frames pushed after the upgrade.
    pub stream_frames: Vec<String>,
    /// Ping before pushing and require a masked pong.
    pub ping_first: bool,
}

impl Default for FakeServiceConfig {
    fn default() -> Self {
        Self {
            version: "TinyTorrent 1.1.0".into(),
            class: "tinytorrent".into(),
            enforce_origin: true,
            missing_file_code: Some(4002),
            bad_path_code: 4003,
            stream_frames: vec![
                r#"{"type":"sync-snapshot","sequence":1,"data":{}}"#.into(),
                r#"{"type":"sync-patch","sequence":2,"patch":{}}"#.into(),
            ],
            ping_first: true,
        }
    }
}

struct Shared {
    config: FakeServiceConfig,
    secret: String,
    rpc_calls: AtomicUsize,
}

pub(crate) struct FakeService {
    port: u16,
    secret: ServiceSecret,
    shared: Arc<Shared>,
    accept: JoinHandle<()>,
}

impl FakeService {
    pub async fn spawn(config: FakeServiceConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let secret = ServiceSecret::generate();
        let shared = Arc::new(Shared {
            config,
            secret: secret.expose().to_string(),
            rpc_calls: AtomicUsize::new(0),
        });

        let accept_shared = shared.clone();
        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let shared = accept_shared.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(req, shared.clone()));
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .with_upgrades()
                        .await;
                });
            }
        });

        Self {
            port,
            secret,
            shared,
            accept,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn secret(&self) -> &ServiceSecret {
        &self.secret
    }

    /// RPC requests received so far, authorised or not.
    pub fn rpc_calls(&self) -> usize {
        self.shared.rpc_calls.load(Ordering::SeqCst)
    }
}

impl Drop for FakeService {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

fn json_response(value: Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(value.to_string())));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    response
}

fn header_value<'a>(req: &'a Request<Incoming>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

async fn handle(
    req: Request<Incoming>,
    shared: Arc<Shared>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::POST, RPC_PATH) => rpc(req, &shared).await,
        (&Method::GET, WS_PATH) => upgrade(req, shared),
        _ => text(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(response)
}

async fn rpc(req: Request<Incoming>, shared: &Shared) -> Response<Full<Bytes>> {
    shared.rpc_calls.fetch_add(1, Ordering::SeqCst);
    let config = &shared.config;

    if header_value(&req, AUTH_HEADER) != Some(shared.secret.as_str()) {
        return text(StatusCode::UNAUTHORIZED, "unauthorized");
    }
    if config.enforce_origin && header_value(&req, "origin") != Some(DEFAULT_ORIGIN) {
        return text(StatusCode::FORBIDDEN, "Forbidden origin");
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return text(StatusCode::BAD_REQUEST, "unreadable body"),
    };
    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let arguments = &request["arguments"];

    json_response(match request["method"].as_str() {
        Some("tt-get-capabilities") => json!({
            "result": "success",
            "arguments": {
                "server-version": config.version,
                "server-class": config.class,
                "websocket-endpoint": WS_PATH,
            }
        }),
        Some("torrent-add") if arguments.get("metainfo-path").is_some() => {
            match config.missing_file_code {
                Some(code) => json!({ "result": "error", "arguments": { "code": code } }),
                None => json!({ "result": "error", "arguments": {} }),
            }
        }
        Some("torrent-add") => json!({
            "result": "error",
            "arguments": { "code": config.bad_path_code }
        }),
        _ => json!({ "result": "method name not recognized" }),
    })
}

fn upgrade(mut req: Request<Incoming>, shared: Arc<Shared>) -> Response<Full<Bytes>> {
    let token = req
        .uri()
        .query()
        .and_then(|q| q.split('&').find_map(|pair| pair.strip_prefix("token=")));
    if token != Some(shared.secret.as_str()) {
        return text(StatusCode::UNAUTHORIZED, "bad token");
    }
    if !header_value(&req, "upgrade").is_some_and(|v| v.eq_ignore_ascii_case("websocket")) {
        return text(StatusCode::BAD_REQUEST, "expected websocket upgrade");
    }

    let on_upgrade = hyper::upgrade::on(&mut req);
    tokio::spawn(async move {
        if let Ok(upgraded) = on_upgrade.await {
            session(TokioIo::new(upgraded), &shared.config).await;
        }
    });

    let mut response = text(StatusCode::SWITCHING_PROTOCOLS, "");
    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, header::HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, header::HeaderValue::from_static("Upgrade"));
    headers.insert(
        header::SEC_WEBSOCKET_ACCEPT,
        header::HeaderValue::from_static("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="),
    );
    response
}

/// One upgraded connection: optional ping, the configured frames, then hold
/// the channel open until the client closes it.
async fn session<S>(mut io: S, config: &FakeServiceConfig)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();

    if config.ping_first {
        if send(&mut io, &Frame::ping("keepalive")).await.is_err() {
            return;
        }
        match read_client_frame(&mut io, &mut buf).await {
            Some((frame, true)) if frame.opcode == Opcode::Pong && frame.payload == "keepalive" => {}
            _ => {
                let _ = send(&mut io, &Frame::close(PROTOCOL_ERROR, "expected masked pong")).await;
                return;
            }
        }
    }

    for payload in &config.stream_frames {
        if send(&mut io, &Frame::text(payload.clone())).await.is_err() {
            return;
        }
    }

    while let Some((frame, masked)) = read_client_frame(&mut io, &mut buf).await {
        if !masked {
            let _ = send(&mut io, &Frame::close(PROTOCOL_ERROR, "unmasked frame")).await;
            return;
        }
        if frame.opcode == Opcode::Close {
            let _ = send(&mut io, &Frame::close(1000, "")).await;
            return;
        }
    }
}

async fn send<S: AsyncWrite + Unpin>(io: &mut S, frame: &Frame) -> std::io::Result<()> {
    io.write_all(&encode_frame(frame, None)).await?;
    io.flush().await
}

/// Next client frame and whether it was masked; `None` at EOF or on error.
async fn read_client_frame<S: AsyncRead + Unpin>(
    io: &mut S,
    buf: &mut BytesMut,
) -> Option<(Frame, bool)> {
    loop {
        let masked = parse_frame_header(buf).ok().flatten().map(|h| h.mask.is_some());
        if let Some(frame) = decode_frame(buf, 1024).ok()? {
            return Some((frame, masked.unwrap_or(false)));
        }
        if io.read_buf(buf).await.ok()? == 0 {
            return None;
        }
    }
}
