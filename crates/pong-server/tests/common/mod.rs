use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use pong_core::net::messages::{ClientMessage, ServerMessage};
use pong_core::net::protocol::{decode_server_message, encode_client_message};
use pong_engine::config::EngineConfig;

use pong_server::build_app;
use pong_server::config::ServerConfig;
use pong_server::state::AppState;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    client: reqwest::Client,
    _shutdown: tokio::task::JoinHandle<()>,
}

/// Config with the built-in engine defaults, so a local `config/engine.toml`
/// cannot change test timing.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        game: Some(EngineConfig::default()),
        ..ServerConfig::default()
    }
}

impl TestServer {
    pub async fn new() -> Self {
        Self::from_config(test_config()).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, state) = build_app(config);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            state,
            client: reqwest::Client::new(),
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn game_url(&self, session_id: u64, user: &str) -> String {
        format!("ws://{}/ws/game/{session_id}?user={user}", self.addr)
    }

    pub fn notify_url(&self, user: &str) -> String {
        format!("ws://{}/ws/notify?user={user}", self.addr)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.base_url()))
            .send()
            .await
            .unwrap()
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.base_url()))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .delete(format!("{}{path}", self.base_url()))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Queue two users and return the session the second join paired them into.
    pub async fn pair(&self, first: &str, second: &str) -> u64 {
        let resp = self
            .post("/api/v1/queue", serde_json::json!({ "user": first }))
            .await;
        assert_eq!(resp.status(), 202);
        let resp = self
            .post("/api/v1/queue", serde_json::json!({ "user": second }))
            .await;
        assert_eq!(resp.status(), 202);
        let body: Value = resp.json().await.unwrap();
        body["paired"][0].as_u64().expect("second join should pair")
    }

    /// Create a local session for `user` and return its id.
    pub async fn local_session(&self, user: &str) -> u64 {
        let resp = self
            .post("/api/v1/sessions/local", serde_json::json!({ "user": user }))
            .await;
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["session_id"].as_u64().unwrap()
    }
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Read raw binary data from a WebSocket stream (5s timeout).
pub async fn ws_read_raw(stream: &mut WsStream) -> Vec<u8> {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return data.to_vec(),
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket message")
}

/// Read and decode the next server message.
pub async fn ws_read_server_msg(stream: &mut WsStream) -> ServerMessage {
    let data = ws_read_raw(stream).await;
    decode_server_message(&data).unwrap()
}

/// Read server messages until one matches `pred`, skipping the rest.
pub async fn ws_read_until<F>(stream: &mut WsStream, mut pred: F) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    let deadline = Duration::from_secs(10);
    tokio::time::timeout(deadline, async {
        loop {
            let msg = ws_read_server_msg(stream).await;
            if pred(&msg) {
                return msg;
            }
        }
    })
    .await
    .expect("Timed out waiting for a matching server message")
}

/// Encode and send a client message.
pub async fn ws_send_client_msg(stream: &mut WsStream, msg: &ClientMessage) {
    let encoded = encode_client_message(msg).unwrap();
    stream.send(Message::Binary(encoded.into())).await.unwrap();
}

/// Poll `path` until `pred` holds for its JSON body (5s timeout).
pub async fn poll_json<F>(server: &TestServer, path: &str, mut pred: F) -> Value
where
    F: FnMut(&Value) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let body: Value = server.get(path).await.json().await.unwrap();
        if pred(&body) {
            return body;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "Timed out polling {path}: {body}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
