use serde::{Deserialize, Serialize};

use crate::sentiment::SentimentCode;
use crate::value_objects::{MessageText, RoomId, SequenceKey, Timestamp, Username};

/// 已持久化的消息，创建后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sequence_key: SequenceKey,
    pub room_id: RoomId,
    pub sender: Username,
    pub text: MessageText,
    pub created_at: Timestamp,
    pub sentiment: SentimentCode,
}

/// 待追加到消息存储的消息，序列号由存储分配。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub sender: Username,
    pub text: MessageText,
    pub sentiment: SentimentCode,
    pub created_at: Timestamp,
}

impl NewMessage {
    pub fn into_message(self, sequence_key: SequenceKey) -> Message {
        Message {
            sequence_key,
            room_id: self.room_id,
            sender: self.sender,
            text: self.text,
            created_at: self.created_at,
            sentiment: self.sentiment,
        }
    }
}
