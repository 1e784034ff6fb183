//! 外部协作方接口
//!
//! 领域层只定义接口，内存与 PostgreSQL 实现位于基础设施层。

use async_trait::async_trait;

use crate::errors::RepositoryError;
use crate::message::{Message, NewMessage};
use crate::room::{Room, RoomMember};
use crate::user::UserRecord;
use crate::value_objects::{RoomId, Username};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// 追加写入的消息存储。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 持久化消息并分配房间内严格递增的序列号。
    /// 返回 `Ok` 表示消息已可通过 `query_page` 读到。
    async fn append(&self, message: NewMessage) -> RepositoryResult<Message>;

    /// 按序列号倒序读取房间消息，跳过 `offset` 条，最多返回 `limit` 条。
    async fn query_page(
        &self,
        room_id: RoomId,
        offset: u64,
        limit: u32,
    ) -> RepositoryResult<Vec<Message>>;
}

/// 房间目录：房间与持久成员关系的增删改查。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn create_room(&self, room: Room, members: Vec<RoomMember>) -> RepositoryResult<Room>;
    async fn find_room(&self, room_id: RoomId) -> RepositoryResult<Option<Room>>;
    async fn rename_room(&self, room_id: RoomId, name: String) -> RepositoryResult<()>;
    async fn add_members(&self, members: Vec<RoomMember>) -> RepositoryResult<()>;
    async fn remove_members(
        &self,
        room_id: RoomId,
        usernames: Vec<Username>,
    ) -> RepositoryResult<()>;
    async fn find_member(
        &self,
        room_id: RoomId,
        username: Username,
    ) -> RepositoryResult<Option<RoomMember>>;
    async fn list_members(&self, room_id: RoomId) -> RepositoryResult<Vec<RoomMember>>;
    async fn rooms_for_user(&self, username: Username) -> RepositoryResult<Vec<Room>>;
}

/// 身份存储：保存用户记录，用户名唯一。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// 用户名已存在时返回 `RepositoryError::Conflict`。
    async fn create(&self, user: UserRecord) -> RepositoryResult<UserRecord>;
    async fn find_by_username(&self, username: Username) -> RepositoryResult<Option<UserRecord>>;
}
