//! 连接注册表
//!
//! 记录每条实时连接的认证用户名和出站通道，向单个连接投递事件。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::{ConnectionId, Timestamp, Username};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::events::ServerEvent;

/// 每条连接的出站事件通道
pub type OutboundSender = mpsc::Sender<ServerEvent>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("connection {0} is not connected")]
    NotConnected(ConnectionId),
    #[error("delivery to connection {0} timed out")]
    Timeout(ConnectionId),
}

#[derive(Debug, Clone)]
struct ConnectionHandle {
    username: Username,
    sender: OutboundSender,
    connected_at: Timestamp,
}

pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionHandle>>>,
    send_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            send_timeout,
        }
    }

    pub async fn register(&self, connection_id: ConnectionId, username: Username, sender: OutboundSender) {
        let handle = ConnectionHandle {
            username: username.clone(),
            sender,
            connected_at: chrono::Utc::now(),
        };
        let replaced = {
            let mut connections = self.connections.write().await;
            connections.insert(connection_id, handle).is_some()
        };
        if replaced {
            debug!(%connection_id, "connection handle replaced");
        }
        info!(%connection_id, %username, "connection registered");
    }

    /// 移除连接。重复调用返回 `None`，不会报错。
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<Username> {
        let removed = {
            let mut connections = self.connections.write().await;
            connections.remove(&connection_id)
        };
        match removed {
            Some(handle) => {
                let online_for = chrono::Utc::now() - handle.connected_at;
                info!(
                    %connection_id,
                    username = %handle.username,
                    online_secs = online_for.num_seconds(),
                    "connection unregistered"
                );
                Some(handle.username)
            }
            None => None,
        }
    }

    pub async fn username_of(&self, connection_id: ConnectionId) -> Option<Username> {
        let connections = self.connections.read().await;
        connections
            .get(&connection_id)
            .map(|handle| handle.username.clone())
    }

    pub async fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&connection_id)
    }

    /// 向单个连接投递事件。
    ///
    /// 出站缓冲满时最多等待 `send_timeout`，超时只影响该连接本身。
    pub async fn send(&self, connection_id: ConnectionId, event: ServerEvent) -> Result<(), DeliveryError> {
        let sender = {
            let connections = self.connections.read().await;
            connections
                .get(&connection_id)
                .map(|handle| handle.sender.clone())
                .ok_or(DeliveryError::NotConnected(connection_id))?
        };

        sender
            .send_timeout(event, self.send_timeout)
            .await
            .map_err(|err| match err {
                mpsc::error::SendTimeoutError::Timeout(_) => DeliveryError::Timeout(connection_id),
                mpsc::error::SendTimeoutError::Closed(_) => DeliveryError::NotConnected(connection_id),
            })
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
