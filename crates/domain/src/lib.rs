//! 聊天室系统核心领域模型
//!
//! 包含用户、房间、消息、情感标注等核心实体，以及外部协作方（消息存储、
//! 房间目录、身份存储）的仓储接口。

pub mod errors;
pub mod message;
pub mod repository;
pub mod room;
pub mod sentiment;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use message::{Message, NewMessage};
pub use repository::{IdentityStore, MessageStore, RepositoryResult, RoomDirectory};
pub use room::{Room, RoomMember};
pub use sentiment::SentimentCode;
pub use user::{DisplayMode, UserRecord};
pub use value_objects::*;

#[cfg(feature = "testing")]
pub use repository::{MockIdentityStore, MockMessageStore, MockRoomDirectory};
