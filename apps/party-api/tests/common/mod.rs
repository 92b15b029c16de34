#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use party_api::config::Config;
use party_api::store::{MemorySocialStore, UserProfile};
use party_api::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestApp {
    pub addr: SocketAddr,
    pub state: AppState,
    pub store: Arc<MemorySocialStore>,
}

/// Start a real TCP server on port 0 with an in-memory social store.
pub async fn spawn_app() -> TestApp {
    let config = Config {
        social_api_url: "http://127.0.0.1:0".to_string(),
        port: 0,
        host_grace_secs: 60,
        unmute_timeout_secs: 30,
    };
    let store = Arc::new(MemorySocialStore::new());
    let state = AppState::new(config, store.clone());
    let app = party_api::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp { addr, state, store }
}

pub fn profile(id: &str, username: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        username: username.to_string(),
        avatar_url: None,
    }
}

pub async fn connect_watch(addr: SocketAddr) -> WsClient {
    connect(addr, "/watch").await
}

pub async fn connect_social(addr: SocketAddr) -> WsClient {
    connect(addr, "/social").await
}

async fn connect(addr: SocketAddr, path: &str) -> WsClient {
    let url = format!("ws://{addr}{path}");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

/// Send one `{v, t, d}` frame.
pub async fn send(ws: &mut WsClient, t: &str, d: Value) {
    let frame = serde_json::json!({ "v": 1, "t": t, "d": d });
    ws.send(tungstenite::Message::Text(frame.to_string().into()))
        .await
        .expect("ws send");
}

/// Send a payload-less `{v, t}` frame.
pub async fn send_plain(ws: &mut WsClient, t: &str) {
    let frame = serde_json::json!({ "v": 1, "t": t });
    ws.send(tungstenite::Message::Text(frame.to_string().into()))
        .await
        .expect("ws send");
}

/// Receive the next text frame as `(t, d)`.
pub async fn recv_event(ws: &mut WsClient) -> (String, Value) {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended")
            .expect("ws read error");
        if !msg.is_text() {
            continue;
        }
        let text = msg.into_text().expect("text frame");
        let frame: Value = serde_json::from_str(&text).expect("parse frame");
        let t = frame["t"].as_str().expect("frame has t").to_string();
        return (t, frame["d"].clone());
    }
}

/// Skip frames until one with the given tag arrives.
pub async fn recv_named(ws: &mut WsClient, t: &str) -> Value {
    loop {
        let (tag, d) = recv_event(ws).await;
        if tag == t {
            return d;
        }
    }
}
