use application::{ClientEvent, ServerEvent};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ConnectionId, Username};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// 单条 WebSocket 连接
///
/// 连接建立时在注册表中登记，之后：
/// - 把客户端事件交给 `ChatService`
/// - 把出站队列中的服务端事件写回 socket
/// - 断开时从所有房间移除并注销
pub struct WebSocketConnection {
    state: AppState,
    username: Username,
}

impl WebSocketConnection {
    pub fn new(state: AppState, username: Username) -> Self {
        Self { state, username }
    }

    pub async fn run(self, socket: WebSocket) {
        let chat = self.state.chat_service.clone();
        let (event_tx, mut event_rx) =
            mpsc::channel::<ServerEvent>(self.state.outbound_buffer.max(1));
        let connection_id = chat.connect(self.username.clone(), event_tx).await;
        tracing::info!(%connection_id, username = %self.username, "websocket connected");

        let (mut sender, mut incoming) = socket.split();

        // 心跳回应走单独的命令通道，所有写操作都在发送任务里完成
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        let mut send_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                    },
                    event = event_rx.recv() => {
                        // 注销后发送端被丢弃，队列关闭
                        let Some(event) = event else { break };
                        match serde_json::to_string(&event) {
                            Ok(json) => WsMessage::Text(json.into()),
                            Err(err) => {
                                tracing::warn!(error = %err, event = event.name(), "failed to serialize server event");
                                continue;
                            }
                        }
                    }
                };
                if sender.send(frame).await.is_err() {
                    tracing::debug!("websocket write failed");
                    break;
                }
            }
            let _ = sender.close().await;
        });

        let mut recv_task = {
            let chat = chat.clone();
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    match message {
                        WsMessage::Text(text) => {
                            Self::handle_text(&chat, connection_id, text.as_str()).await;
                        }
                        WsMessage::Ping(data) => {
                            if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                                break;
                            }
                        }
                        WsMessage::Close(_) => {
                            tracing::debug!(%connection_id, "websocket close frame received");
                            break;
                        }
                        WsMessage::Pong(_) | WsMessage::Binary(_) => {}
                    }
                }
            })
        };

        // 被中止的任务必须真正结束，之后才能清理成员表
        tokio::select! {
            _ = &mut send_task => {
                recv_task.abort();
                let _ = recv_task.await;
            }
            _ = &mut recv_task => {
                send_task.abort();
                let _ = send_task.await;
            }
        }

        chat.disconnect(connection_id).await;
        tracing::info!(%connection_id, username = %self.username, "websocket disconnected");
    }

    async fn handle_text(
        chat: &application::ChatService,
        connection_id: ConnectionId,
        text: &str,
    ) {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(%connection_id, error = %err, "unparseable client event");
                let _ = chat
                    .notify(connection_id, ServerEvent::invalid_event(err.to_string()))
                    .await;
                return;
            }
        };

        let name = event.name();
        // 失败时 ChatService 已经向该连接回送了 error 事件
        if let Err(err) = chat.handle_event(connection_id, event).await {
            tracing::debug!(%connection_id, event = name, error = %err, "client event rejected");
        }
    }
}

#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}
