//! 实时通道上的事件格式
//!
//! 所有事件都编码为 `{"event": "<name>", "data": {...}}`。

use domain::{Message, RoomId, SentimentCode, SequenceKey, Timestamp, Username};
use serde::{Deserialize, Serialize};

use crate::error::ApplicationError;

/// 客户端发往服务端的事件。
///
/// `username` 字段只为兼容旧客户端而保留，服务端始终使用连接认证时确定的用户名。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom {
        #[serde(default)]
        username: Option<String>,
        room: RoomId,
    },
    LeaveRoom {
        #[serde(default)]
        username: Option<String>,
        room: RoomId,
    },
    SendMessage {
        #[serde(default)]
        username: Option<String>,
        room: RoomId,
        message: String,
    },
}

impl ClientEvent {
    pub fn room(&self) -> RoomId {
        match self {
            ClientEvent::JoinRoom { room, .. }
            | ClientEvent::LeaveRoom { room, .. }
            | ClientEvent::SendMessage { room, .. } => *room,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "join_room",
            ClientEvent::LeaveRoom { .. } => "leave_room",
            ClientEvent::SendMessage { .. } => "send_message",
        }
    }
}

/// 服务端推送给客户端的事件。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ReceiveMessage(ReceivedMessage),
    JoinRoomAnnouncement(Announcement),
    LeaveRoomAnnouncement(Announcement),
    Error(ErrorNotice),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceivedMessage {
    pub username: Username,
    pub room: RoomId,
    pub message: String,
    pub created_at: Timestamp,
    pub sentiment: SentimentCode,
    pub glyph: String,
    pub sequence_key: SequenceKey,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Announcement {
    pub username: Username,
    pub room: RoomId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorNotice {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomId>,
}

impl From<&Message> for ReceivedMessage {
    fn from(message: &Message) -> Self {
        Self {
            username: message.sender.clone(),
            room: message.room_id,
            message: message.text.as_str().to_owned(),
            created_at: message.created_at,
            sentiment: message.sentiment,
            glyph: message.sentiment.glyph().to_string(),
            sequence_key: message.sequence_key,
        }
    }
}

impl ServerEvent {
    pub fn receive_message(message: &Message) -> Self {
        ServerEvent::ReceiveMessage(ReceivedMessage::from(message))
    }

    pub fn joined(username: Username, room: RoomId) -> Self {
        ServerEvent::JoinRoomAnnouncement(Announcement { username, room })
    }

    pub fn left(username: Username, room: RoomId) -> Self {
        ServerEvent::LeaveRoomAnnouncement(Announcement { username, room })
    }

    pub fn error(err: &ApplicationError, room: Option<RoomId>) -> Self {
        ServerEvent::Error(ErrorNotice {
            code: err.code().to_owned(),
            message: err.to_string(),
            room,
        })
    }

    /// 客户端发来无法解析的事件
    pub fn invalid_event(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorNotice {
            code: "INVALID_EVENT".to_owned(),
            message: message.into(),
            room: None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ReceiveMessage(_) => "receive_message",
            ServerEvent::JoinRoomAnnouncement(_) => "join_room_announcement",
            ServerEvent::LeaveRoomAnnouncement(_) => "leave_room_announcement",
            ServerEvent::Error(_) => "error",
        }
    }
}
