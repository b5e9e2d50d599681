//! The relay served over a real socket.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use provider_relay::config::{parse_config, RelayConfig};
use provider_relay::lifecycle::{assemble, Shutdown};
use provider_relay::RelayServer;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONFIG: &str = r#"
[relay]
poll_interval_ms = 50
discovery_timeout_secs = 10

[[relay.providers]]
name = "unisat"

[[fixtures]]
name = "unisat"
events = ["accountsChanged"]

[[fixtures.methods]]
name = "getAddress"
result = "bc1qfixture"

[[fixtures.methods]]
name = "signPsbt"
error = "User rejected the request"
delay_ms = 20
"#;

struct Running {
    addr: SocketAddr,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), std::io::Error>>,
}

async fn spawn_server(config: RelayConfig) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = RelayServer::new(assemble(&config), &config.listener);
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.clone()));
    Running { addr, shutdown, handle }
}

async fn connect(addr: SocketAddr) -> Client {
    let mut request = format!("ws://{}/relay", addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("https://app.example"));
    let (socket, _) = connect_async(request).await.unwrap();
    socket
}

async fn send(socket: &mut Client, message: Value) {
    socket.send(Message::Text(message.to_string().into())).await.unwrap();
}

async fn recv(socket: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_frame_session_over_websocket() {
    let running = spawn_server(parse_config(CONFIG).unwrap()).await;
    let mut socket = connect(running.addr).await;

    let metadata = recv(&mut socket).await;
    assert_eq!(
        metadata,
        json!({
            "type": "PROVIDER_METADATA",
            "providerName": "unisat",
            "methods": ["getAddress", "signPsbt", "on"],
        })
    );
    send(&mut socket, json!({ "type": "PROVIDER_ACKNOWLEDGMENT", "providerName": "unisat" })).await;

    send(
        &mut socket,
        json!({ "type": "CALL_METHOD", "providerName": "unisat", "methodName": "signPsbt", "args": ["cHNidP8="], "requestId": 1 }),
    )
    .await;
    assert_eq!(
        recv(&mut socket).await,
        json!({ "type": "METHOD_RESPONSE", "requestId": 1, "error": "User rejected the request" })
    );

    send(
        &mut socket,
        json!({ "type": "SUBSCRIBE_EVENT", "providerName": "unisat", "eventName": "accountsChanged" }),
    )
    .await;
    // Frames are handled in order, so this answer means the subscription is in place.
    send(
        &mut socket,
        json!({ "type": "CALL_METHOD", "providerName": "unisat", "methodName": "getAddress", "requestId": "r2" }),
    )
    .await;
    assert_eq!(
        recv(&mut socket).await,
        json!({ "type": "METHOD_RESPONSE", "requestId": "r2", "result": "bc1qfixture" })
    );

    let http = reqwest::Client::new();
    let res = http
        .post(format!("http://{}/fixtures/unisat/events/accountsChanged", running.addr))
        .body(r#"["bc1qother"]"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::ACCEPTED);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "listeners": 1 }));

    assert_eq!(
        recv(&mut socket).await,
        json!({
            "type": "EVENT_TRIGGER",
            "providerName": "unisat",
            "eventName": "accountsChanged",
            "data": ["bc1qother"],
        })
    );

    let status: Value = http
        .get(format!("http://{}/status", running.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["phase"], "complete");
    assert_eq!(status["acknowledged"], json!(["unisat"]));
    assert_eq!(status["endpoints"], 1);
    assert_eq!(status["subscriptions"][0]["subscribers"], 1);

    socket.close(None).await.unwrap();
    running.shutdown.trigger();
    running.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connection_limit() {
    let mut config = parse_config(CONFIG).unwrap();
    config.listener.max_connections = 1;
    let running = spawn_server(config).await;

    let mut first = connect(running.addr).await;
    let request = format!("ws://{}/relay", running.addr).into_client_request().unwrap();
    assert!(connect_async(request).await.is_err());

    // Closing the socket hands its slot back.
    first.close(None).await.unwrap();
    let mut reconnected = None;
    for _ in 0..50 {
        let request = format!("ws://{}/relay", running.addr).into_client_request().unwrap();
        if let Ok((socket, _)) = connect_async(request).await {
            reconnected = Some(socket);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(reconnected.is_some(), "slot was never released");

    running.shutdown.trigger();
}

#[tokio::test]
async fn test_fixture_emit_errors() {
    let config = parse_config(CONFIG).unwrap();
    let server = RelayServer::new(assemble(&config), &config.listener);

    let cases = [
        ("/fixtures/phantom/events/accountsChanged", "", StatusCode::NOT_FOUND),
        ("/fixtures/unisat/events/networkChanged", "", StatusCode::UNPROCESSABLE_ENTITY),
        ("/fixtures/unisat/events/accountsChanged", "{not json", StatusCode::BAD_REQUEST),
        ("/fixtures/unisat/events/accountsChanged", "", StatusCode::ACCEPTED),
    ];
    for (uri, body, expected) in cases {
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), expected, "{}", uri);
    }
}

#[tokio::test]
async fn test_status_before_start() {
    let config = parse_config(CONFIG).unwrap();
    let server = RelayServer::new(assemble(&config), &config.listener);

    let response = server
        .router()
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let status: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status["phase"], "idle");
    assert_eq!(status["target_origin"], "*");
    assert_eq!(status["detected"], json!([]));
}
