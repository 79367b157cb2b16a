//! End-to-end tests for the switchboard host over a real WebSocket.
//!
//! Each test starts a full host (listener, dispatcher, `base` domain) on a
//! private port window and drives it with a plain tokio-tungstenite client,
//! the same way an external editor process would.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use switchboard_core::{
    ArgSpec, CommandResult, DomainModule, DomainRegistry, DomainVersion, Handler, HandlerError,
    StaticModuleResolver,
};
use switchboard_host::{Host, HostConfig};
use switchboard_rpc::{Request, ServerMessage, decode_binary_response};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// Shared window; the port scan makes parallel tests land on distinct ports.
const TEST_PORT_START: u16 = 28300;
const TEST_PORT_WINDOW: u16 = 200;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A small domain used as a loadable module: one sync command, one async
/// command with progress, one binary-returning command.
struct MathModule;

impl DomainModule for MathModule {
    fn init(&self, registry: &mut DomainRegistry) -> switchboard_core::Result<()> {
        registry.register_domain("math", DomainVersion::Versioned { major: 1, minor: 0 });
        registry.register_command(
            "math",
            "addTen",
            Handler::sync(|params| {
                let n = params
                    .first()
                    .and_then(Value::as_i64)
                    .ok_or_else(|| HandlerError::new("expected a number"))?;
                Ok(CommandResult::Json(json!(n + 10)))
            }),
            "Add ten to a number",
            vec![ArgSpec::new("n", "number")],
            vec![ArgSpec::new("sum", "number")],
        )?;
        registry.register_command(
            "math",
            "countdown",
            Handler::async_fn(|params, responder| {
                let from = params.first().and_then(Value::as_u64).unwrap_or(0);
                tokio::spawn(async move {
                    for n in (1..=from).rev() {
                        responder.progress(json!(n));
                    }
                    responder.resolve(json!("liftoff"));
                });
            }),
            "Count down with progress, then resolve",
            vec![ArgSpec::new("from", "number")],
            vec![ArgSpec::new("done", "string")],
        )?;
        registry.register_command(
            "math",
            "rawBytes",
            Handler::sync(|_| Ok(CommandResult::Binary(vec![0xde, 0xad, 0xbe, 0xef].into()))),
            "Return a raw binary payload",
            vec![],
            vec![],
        )?;
        Ok(())
    }
}

async fn start_test_host() -> Host {
    let mut resolver = StaticModuleResolver::new();
    resolver.insert("/modules/math", Arc::new(MathModule));
    resolver.insert_opaque("/modules/no-init");
    Host::start(HostConfig {
        port_start: TEST_PORT_START,
        port_window: TEST_PORT_WINDOW,
        resolver: Arc::new(resolver),
    })
    .await
    .expect("host should start")
}

async fn connect(host: &Host) -> WsClient {
    let url = format!("ws://127.0.0.1:{}/", host.port());
    let (client, _response) = connect_async(url.as_str()).await.expect("WebSocket connect");
    client
}

async fn send_request(client: &mut WsClient, request: &Request) {
    let raw = serde_json::to_string(request).unwrap();
    client.send(WsMessage::Text(raw)).await.unwrap();
}

/// Receive text frames until one parses to a message matching `pred`.
async fn recv_matching<F>(client: &mut WsClient, mut pred: F) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    loop {
        let frame = timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("socket error");
        if let WsMessage::Text(raw) = frame {
            let message = ServerMessage::parse(&raw).expect("well-formed server message");
            if pred(&message) {
                return message;
            }
        }
    }
}

async fn recv_binary(client: &mut WsClient) -> Vec<u8> {
    loop {
        let frame = timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for binary frame")
            .expect("stream ended")
            .expect("socket error");
        if let WsMessage::Binary(bytes) = frame {
            return bytes;
        }
    }
}

fn load_request(id: u32, paths: &[&str]) -> Request {
    Request::new(id, "base", "loadDomainModulesFromPaths").with_parameters(vec![json!(paths)])
}

#[tokio::test]
async fn test_load_module_then_call_its_command() {
    let host = start_test_host().await;
    let mut client = connect(&host).await;

    send_request(&mut client, &load_request(1, &["/modules/math"])).await;
    let response = recv_matching(&mut client, |m| {
        matches!(m, ServerMessage::CommandResponse { id: 1, .. })
    })
    .await;
    let ServerMessage::CommandResponse { response, .. } = response else {
        unreachable!();
    };
    assert_eq!(response, json!(true));

    send_request(
        &mut client,
        &Request::new(2, "math", "addTen").with_parameters(vec![json!(32)]),
    )
    .await;
    let response = recv_matching(&mut client, |m| {
        matches!(m, ServerMessage::CommandResponse { id: 2, .. })
    })
    .await;
    let ServerMessage::CommandResponse { response, .. } = response else {
        unreachable!();
    };
    assert_eq!(response, json!(42));

    host.shutdown();
}

#[tokio::test]
async fn test_successful_load_fires_new_domains_event() {
    let host = start_test_host().await;
    let mut client = connect(&host).await;

    send_request(&mut client, &load_request(1, &["/modules/math"])).await;
    let event = recv_matching(&mut client, |m| matches!(m, ServerMessage::Event { .. })).await;
    let ServerMessage::Event { domain, event, .. } = event else {
        unreachable!();
    };
    assert_eq!(domain, "base");
    assert_eq!(event, "newDomains");

    host.shutdown();
}

#[tokio::test]
async fn test_unknown_command_reports_command_error() {
    let host = start_test_host().await;
    let mut client = connect(&host).await;

    send_request(&mut client, &Request::new(7, "nope", "missing")).await;
    let error = recv_matching(&mut client, |m| {
        matches!(m, ServerMessage::CommandError { id: 7, .. })
    })
    .await;
    let ServerMessage::CommandError { message, .. } = error else {
        unreachable!();
    };
    assert_eq!(message, "no such command: nope.missing");

    host.shutdown();
}

#[tokio::test]
async fn test_module_without_init_rejects_and_leaves_registry_unchanged() {
    let host = start_test_host().await;
    let mut client = connect(&host).await;

    send_request(&mut client, &load_request(7, &["/modules/no-init"])).await;
    let error = recv_matching(&mut client, |m| {
        matches!(m, ServerMessage::CommandError { id: 7, .. })
    })
    .await;
    let ServerMessage::CommandError { message, .. } = error else {
        unreachable!();
    };
    assert!(message.contains("init()"), "unexpected message: {message}");

    let registry = host.dispatcher().registry().read().await;
    let domains = registry.domain_descriptions();
    assert_eq!(domains.keys().collect::<Vec<_>>(), vec!["base"]);
    drop(registry);

    host.shutdown();
}

#[tokio::test]
async fn test_async_progress_precedes_terminal_response() {
    let host = start_test_host().await;
    let mut client = connect(&host).await;

    send_request(&mut client, &load_request(1, &["/modules/math"])).await;
    recv_matching(&mut client, |m| {
        matches!(m, ServerMessage::CommandResponse { id: 1, .. })
    })
    .await;

    send_request(
        &mut client,
        &Request::new(2, "math", "countdown").with_parameters(vec![json!(3)]),
    )
    .await;

    let mut progress = Vec::new();
    loop {
        let message = recv_matching(&mut client, |m| {
            matches!(
                m,
                ServerMessage::CommandProgress { id: 2, .. } | ServerMessage::CommandResponse { id: 2, .. }
            )
        })
        .await;
        match message {
            ServerMessage::CommandProgress { message, .. } => progress.push(message),
            ServerMessage::CommandResponse { response, .. } => {
                assert_eq!(response, json!("liftoff"));
                break;
            }
            _ => unreachable!(),
        }
    }
    assert_eq!(progress, vec![json!(3), json!(2), json!(1)]);

    host.shutdown();
}

#[tokio::test]
async fn test_binary_response_framing_over_websocket() {
    let host = start_test_host().await;
    let mut client = connect(&host).await;

    send_request(&mut client, &load_request(1, &["/modules/math"])).await;
    recv_matching(&mut client, |m| {
        matches!(m, ServerMessage::CommandResponse { id: 1, .. })
    })
    .await;

    send_request(&mut client, &Request::new(9, "math", "rawBytes")).await;
    let frame = recv_binary(&mut client).await;
    let (id, payload) = decode_binary_response(&frame).unwrap();
    assert_eq!(id, 9);
    assert_eq!(payload.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);

    host.shutdown();
}

#[tokio::test]
async fn test_malformed_message_keeps_connection_open() {
    let host = start_test_host().await;
    let mut client = connect(&host).await;

    client
        .send(WsMessage::Text("this is not json".to_string()))
        .await
        .unwrap();
    let error = recv_matching(&mut client, |m| matches!(m, ServerMessage::Error { .. })).await;
    let ServerMessage::Error { message } = error else {
        unreachable!();
    };
    assert!(message.starts_with("Malformed message"));

    // The connection still works afterwards.
    send_request(&mut client, &load_request(3, &["/modules/math"])).await;
    recv_matching(&mut client, |m| {
        matches!(m, ServerMessage::CommandResponse { id: 3, .. })
    })
    .await;

    host.shutdown();
}

#[tokio::test]
async fn test_api_endpoint_serves_registry_snapshot() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let host = start_test_host().await;
    let mut stream = TcpStream::connect(("127.0.0.1", host.port())).await.unwrap();
    stream
        .write_all(b"GET /api HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    timeout(RECV_TIMEOUT, stream.read_to_string(&mut response))
        .await
        .expect("timed out reading HTTP response")
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: application/json\r\n"));
    let body = response.split("\r\n\r\n").nth(1).expect("body present");
    let snapshot: Value = serde_json::from_str(body).unwrap();
    assert!(snapshot["base"]["commands"]["loadDomainModulesFromPaths"].is_object());

    host.shutdown();
}

#[tokio::test]
async fn test_unknown_http_path_is_404() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let host = start_test_host().await;
    let mut stream = TcpStream::connect(("127.0.0.1", host.port())).await.unwrap();
    stream
        .write_all(b"GET /other HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    timeout(RECV_TIMEOUT, stream.read_to_string(&mut response))
        .await
        .expect("timed out reading HTTP response")
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(response.contains("Content-Type: text/plain\r\n"));

    host.shutdown();
}

#[tokio::test]
async fn test_events_broadcast_to_every_client() {
    let host = start_test_host().await;
    let mut first = connect(&host).await;
    let mut second = connect(&host).await;

    // A full request round trip on the second client guarantees its
    // session is registered before the broadcast fires.
    send_request(&mut second, &Request::new(99, "warmup", "probe")).await;
    recv_matching(&mut second, |m| {
        matches!(m, ServerMessage::CommandError { id: 99, .. })
    })
    .await;

    send_request(&mut first, &load_request(1, &["/modules/math"])).await;

    for client in [&mut first, &mut second] {
        let event = recv_matching(client, |m| matches!(m, ServerMessage::Event { .. })).await;
        let ServerMessage::Event { domain, event, .. } = event else {
            unreachable!();
        };
        assert_eq!((domain.as_str(), event.as_str()), ("base", "newDomains"));
    }

    host.shutdown();
}
