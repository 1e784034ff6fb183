#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use config::AppConfig;
use futures_util::{SinkExt, StreamExt};
use infrastructure::{BcryptPasswordHasher, Infrastructure, LexiconClassifier};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_WAIT: Duration = Duration::from_secs(3);

/// 全内存装配的服务端，监听随机端口
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let config = AppConfig::default();
        let infra = Infrastructure::in_memory(
            Arc::new(BcryptPasswordHasher::new(Some(4))),
            Arc::new(LexiconClassifier::builtin()),
        );
        let app = router(AppState::build(&config, infra));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            client: Client::new(),
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/api/v1/ws?token={}", self.addr, token)
    }

    pub async fn signup(&self, username: &str) -> reqwest::Response {
        self.client
            .post(self.http("/api/v1/auth/signup"))
            .json(&json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "secret-pass",
            }))
            .send()
            .await
            .expect("signup request")
    }

    /// 注册并登录，返回 token
    pub async fn register(&self, username: &str) -> String {
        let response = self.signup(username).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body: Value = self
            .client
            .post(self.http("/api/v1/auth/login"))
            .json(&json!({ "username": username, "password": "secret-pass" }))
            .send()
            .await
            .expect("login request")
            .json()
            .await
            .expect("login json");
        body["token"].as_str().expect("token").to_owned()
    }

    /// 创建房间，返回房间 id
    pub async fn create_room(&self, token: &str, name: &str, members: &[&str]) -> String {
        let response = self
            .client
            .post(self.http("/api/v1/rooms"))
            .bearer_auth(token)
            .json(&json!({ "name": name, "members": members }))
            .send()
            .await
            .expect("create room request");
        assert_eq!(response.status(), StatusCode::CREATED);

        let body: Value = response.json().await.expect("room json");
        body["room"]["id"].as_str().expect("room id").to_owned()
    }

    pub async fn connect(&self, token: &str) -> WsClient {
        let (socket, _) = connect_async(self.ws_url(token))
            .await
            .expect("websocket handshake");
        socket
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn send_event(socket: &mut WsClient, event: Value) {
    socket
        .send(TungsteniteMessage::Text(event.to_string().into()))
        .await
        .expect("send event");
}

/// 等待下一条服务端事件，跳过心跳帧
pub async fn next_event(socket: &mut WsClient) -> Value {
    loop {
        let frame = timeout(EVENT_WAIT, socket.next())
            .await
            .expect("timed out waiting for server event")
            .expect("socket closed")
            .expect("socket error");
        if let TungsteniteMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("event json");
        }
    }
}

/// 在给定时间内没有任何事件到达
pub async fn assert_silent(socket: &mut WsClient, wait: Duration) {
    if let Ok(Some(Ok(TungsteniteMessage::Text(text)))) = timeout(wait, socket.next()).await {
        panic!("unexpected event: {text}");
    }
}
