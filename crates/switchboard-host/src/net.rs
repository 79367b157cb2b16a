//! Network transport: port discovery, HTTP introspection, and the
//! WebSocket upgrade path.
//!
//! One TCP port serves both surfaces. Each accepted connection has its
//! request head read first; upgrade requests become WebSocket sessions
//! feeding the dispatcher, everything else is answered as plain HTTP
//! (`GET /api` returns the domain registry snapshot).

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{SinkExt, StreamExt};
use switchboard_core::{Broadcaster, Connection, Dispatcher, QueueChannel};
use switchboard_rpc::Frame;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::error::{HostError, Result};

pub const DEFAULT_PORT_START: u16 = 8123;
pub const DEFAULT_PORT_WINDOW: u16 = 1000;

const MAX_HEAD_BYTES: usize = 8 * 1024;

/// Bind the first free loopback port in `[start, start + window)`.
///
/// # Errors
///
/// Returns [`HostError::NoFreePort`] when every port in the window is taken.
pub async fn bind_free_port(start: u16, window: u16) -> Result<(TcpListener, u16)> {
    let end = start.saturating_add(window);
    for port in start..end {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                debug!("bound loopback port {}", port);
                return Ok((listener, port));
            }
            Err(_) => continue,
        }
    }
    Err(HostError::NoFreePort { start, end })
}

/// Accept connections until the listener task is dropped.
pub async fn run_listener(
    listener: TcpListener,
    dispatcher: Dispatcher,
    broadcaster: Broadcaster,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                debug!("connection from {}", peer_addr);
                let dispatcher = dispatcher.clone();
                let broadcaster = broadcaster.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, dispatcher, broadcaster).await {
                        warn!("client session from {} failed: {}", peer_addr, err);
                    }
                });
            }
            Err(err) => {
                warn!("accept error: {}", err);
            }
        }
    }
}

async fn handle_client(
    mut stream: TcpStream,
    dispatcher: Dispatcher,
    broadcaster: Broadcaster,
) -> Result<()> {
    let head = read_request_head(&mut stream).await?;
    let request = RequestHead::parse(&head);

    if request.is_upgrade {
        let replay = Rewind::new(head, stream);
        run_session(replay, dispatcher, broadcaster).await
    } else {
        serve_http(&mut stream, &request, &dispatcher).await
    }
}

/// Consume the HTTP request head (through the blank line) from the stream.
/// The bytes are handed back so the upgrade path can replay them.
async fn read_request_head(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(512);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_HEAD_BYTES {
            return Err(HostError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "request head too large",
            )));
        }
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(HostError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        head.push(byte[0]);
    }
    Ok(head)
}

struct RequestHead {
    method: String,
    path: String,
    is_upgrade: bool,
}

impl RequestHead {
    fn parse(head: &[u8]) -> Self {
        let text = String::from_utf8_lossy(head);
        let mut lines = text.lines();
        let request_line = lines.next().unwrap_or("");
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or("").to_string();
        let path = parts.next().unwrap_or("").to_string();
        let is_upgrade = lines.any(|line| {
            let Some((name, value)) = line.split_once(':') else {
                return false;
            };
            name.eq_ignore_ascii_case("upgrade")
                && value.trim().eq_ignore_ascii_case("websocket")
        });
        Self {
            method,
            path,
            is_upgrade,
        }
    }
}

async fn serve_http(
    stream: &mut TcpStream,
    request: &RequestHead,
    dispatcher: &Dispatcher,
) -> Result<()> {
    let response = if request.method == "GET" && request.path == "/api" {
        let snapshot = {
            let registry = dispatcher.registry().read().await;
            serde_json::to_string(&registry.domain_descriptions())?
        };
        http_response(200, "OK", "application/json", &snapshot)
    } else {
        http_response(404, "Not Found", "text/plain", "Not Found")
    };
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

fn http_response(status: u16, reason: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// One WebSocket client session: upgrade, pump outbound frames, feed
/// inbound text to the dispatcher.
async fn run_session<S>(
    stream: S,
    dispatcher: Dispatcher,
    broadcaster: Broadcaster,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws_stream = accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (channel, mut outbound_rx) = QueueChannel::new();
    let connection = Connection::new(channel);
    let session_id = connection.session_id().clone();
    info!("WebSocket session established: {}", session_id);
    broadcaster.register(connection.clone());

    // Outbound pump: ends when the connection closes (sender dropped) or
    // the socket rejects a write.
    let pump = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let message = match frame {
                Frame::Text(text) => WsMessage::Text(text),
                Frame::Binary(bytes) => WsMessage::Binary(bytes.to_vec()),
            };
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(WsMessage::Text(raw)) => {
                connection.receive(&raw, &dispatcher).await;
            }
            Ok(WsMessage::Binary(_)) => {
                warn!("session {}: inbound binary frame ignored", session_id);
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => {}
            Err(err) => {
                debug!("session {}: socket error: {}", session_id, err);
                break;
            }
        }
    }

    broadcaster.unregister(&session_id);
    connection.close();
    let _ = pump.await;
    info!("WebSocket session closed: {}", session_id);
    Ok(())
}

/// Replays already-consumed bytes before reading from the inner stream.
/// Lets the upgrade handshake re-see the request head that routing consumed.
struct Rewind<S> {
    prefix: Vec<u8>,
    offset: usize,
    inner: S,
}

impl<S> Rewind<S> {
    fn new(prefix: Vec<u8>, inner: S) -> Self {
        Self {
            prefix,
            offset: 0,
            inner,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Rewind<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.offset < self.prefix.len() {
            let remaining = &self.prefix[self.offset..];
            let n = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..n]);
            self.offset += n;
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Rewind<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
