use std::sync::Arc;

use dashmap::DashMap;
use domain::{ConnectionId, Message, RoomDirectory, RoomId, Username};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    dispatcher::BroadcastDispatcher,
    error::ApplicationError,
    events::{ClientEvent, ServerEvent},
    membership::RoomMembershipTable,
    pipeline::MessagePipeline,
    registry::{ConnectionRegistry, DeliveryError, OutboundSender},
};

pub struct ChatServiceDependencies {
    pub registry: Arc<ConnectionRegistry>,
    pub membership: Arc<RoomMembershipTable>,
    pub dispatcher: Arc<BroadcastDispatcher>,
    pub pipeline: Arc<MessagePipeline>,
    pub directory: Arc<dyn RoomDirectory>,
}

/// 实时通道上的用例：连接、加入/离开房间、发消息、断开。
pub struct ChatService {
    deps: ChatServiceDependencies,
    // 同一房间的 join 与 revoke 串行执行
    room_gates: DashMap<RoomId, Arc<Mutex<()>>>,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self {
            deps,
            room_gates: DashMap::new(),
        }
    }

    fn gate(&self, room_id: RoomId) -> Arc<Mutex<()>> {
        self.room_gates.entry(room_id).or_default().clone()
    }

    // 调用方必须先释放自己持有的 Arc
    fn release_gate(&self, room_id: RoomId) {
        self.room_gates
            .remove_if(&room_id, |_, gate| Arc::strong_count(gate) == 1);
    }

    pub fn pipeline(&self) -> &MessagePipeline {
        &self.deps.pipeline
    }

    /// 注册一条新连接，用户名在连接生命周期内不变。
    pub async fn connect(&self, username: Username, sender: OutboundSender) -> ConnectionId {
        let connection_id = ConnectionId::generate();
        self.deps
            .registry
            .register(connection_id, username, sender)
            .await;
        connection_id
    }

    async fn username_of(&self, connection_id: ConnectionId) -> Result<Username, ApplicationError> {
        self.deps
            .registry
            .username_of(connection_id)
            .await
            .ok_or(ApplicationError::NotConnected(connection_id))
    }

    // 成员检查，必须在任何状态变更之前完成
    async fn ensure_member(&self, room_id: RoomId, username: &Username) -> Result<(), ApplicationError> {
        match self
            .deps
            .directory
            .find_member(room_id, username.clone())
            .await?
        {
            Some(_) => Ok(()),
            None => Err(ApplicationError::authorization(room_id)),
        }
    }

    /// 加入房间并广播加入通告，重复加入不会重复通告。
    ///
    /// 目录查询与写入成员表在房间闸门内完成，与 [`ChatService::revoke`] 互斥。
    pub async fn join_room(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<bool, ApplicationError> {
        let username = self.username_of(connection_id).await?;

        let gate = self.gate(room_id);
        let result = {
            let _guard = gate.lock().await;
            self.join_gated(connection_id, room_id, username).await
        };
        drop(gate);
        self.release_gate(room_id);
        result
    }

    async fn join_gated(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
        username: Username,
    ) -> Result<bool, ApplicationError> {
        self.ensure_member(room_id, &username).await?;

        let joined = self.deps.membership.join(room_id, connection_id);
        // 目录查询期间连接可能已断开，disconnect 先注销再清理成员表
        if !self.deps.registry.is_connected(connection_id).await {
            self.deps.membership.leave(room_id, connection_id);
            return Err(ApplicationError::NotConnected(connection_id));
        }

        if joined {
            info!(%room_id, %username, "user joined room");
            self.deps
                .dispatcher
                .broadcast(room_id, ServerEvent::joined(username, room_id))
                .await;
        }
        Ok(joined)
    }

    /// 离开房间。离开只会收缩访问范围，因此不查询房间目录。
    pub async fn leave_room(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<bool, ApplicationError> {
        let username = self.username_of(connection_id).await?;

        let left = self.deps.membership.leave(room_id, connection_id);
        if left {
            info!(%room_id, %username, "user left room");
            self.deps
                .dispatcher
                .broadcast(room_id, ServerEvent::left(username, room_id))
                .await;
        }
        Ok(left)
    }

    pub async fn send_message(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
        text: String,
    ) -> Result<Message, ApplicationError> {
        let username = self.username_of(connection_id).await?;
        self.ensure_member(room_id, &username).await?;
        self.deps.pipeline.submit(room_id, username, text).await
    }

    /// 处理一条客户端事件。失败时只向该连接回送 `error` 事件，然后把错误交还调用方。
    pub async fn handle_event(
        &self,
        connection_id: ConnectionId,
        event: ClientEvent,
    ) -> Result<(), ApplicationError> {
        let room_id = event.room();
        let result = match event {
            ClientEvent::JoinRoom { .. } => self.join_room(connection_id, room_id).await.map(|_| ()),
            ClientEvent::LeaveRoom { .. } => self.leave_room(connection_id, room_id).await.map(|_| ()),
            ClientEvent::SendMessage { message, .. } => self
                .send_message(connection_id, room_id, message)
                .await
                .map(|_| ()),
        };

        if let Err(err) = &result {
            let _ = self
                .notify(connection_id, ServerEvent::error(err, Some(room_id)))
                .await;
        }
        result
    }

    /// 只发给单个连接的事件
    pub async fn notify(
        &self,
        connection_id: ConnectionId,
        event: ServerEvent,
    ) -> Result<(), DeliveryError> {
        let result = self.deps.registry.send(connection_id, event).await;
        if let Err(err) = &result {
            warn!(%connection_id, error = %err, "direct notification dropped");
        }
        result
    }

    /// 连接断开：先注销，再从所有房间移除，然后向原房间广播离开通告。
    /// 重复调用是安全的。
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let username = self.deps.registry.unregister(connection_id).await;
        let rooms = self.deps.membership.on_disconnect(connection_id);
        let Some(username) = username else {
            return;
        };
        for room_id in rooms {
            info!(%room_id, %username, "user disconnected from room");
            self.deps
                .dispatcher
                .broadcast(room_id, ServerEvent::left(username.clone(), room_id))
                .await;
        }
    }

    /// 把已被移出房间目录的用户的在线连接踢出房间。
    pub async fn revoke(&self, room_id: RoomId, usernames: &[Username]) -> usize {
        let gate = self.gate(room_id);
        let revoked = {
            let _guard = gate.lock().await;
            self.revoke_gated(room_id, usernames).await
        };
        drop(gate);
        self.release_gate(room_id);
        revoked
    }

    async fn revoke_gated(&self, room_id: RoomId, usernames: &[Username]) -> usize {
        let mut revoked = 0;
        for connection_id in self.deps.membership.members_of(room_id) {
            let Some(username) = self.deps.registry.username_of(connection_id).await else {
                continue;
            };
            if !usernames.contains(&username) {
                continue;
            }
            if self.deps.membership.leave(room_id, connection_id) {
                revoked += 1;
                self.deps
                    .dispatcher
                    .broadcast(room_id, ServerEvent::left(username, room_id))
                    .await;
            }
        }
        revoked
    }

    /// 分页读取历史，调用方必须是房间成员。
    pub async fn history(
        &self,
        username: &Username,
        room_id: RoomId,
        page: u32,
    ) -> Result<Vec<Message>, ApplicationError> {
        self.ensure_member(room_id, username).await?;
        self.deps.pipeline.history(room_id, page).await
    }
}
