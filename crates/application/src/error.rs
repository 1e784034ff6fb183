use domain::{ConnectionId, DomainError, RepositoryError, RoomId};
use thiserror::Error;

use crate::password::PasswordHasherError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 输入校验失败（ValidationError），同步拒绝，不会持久化或广播
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    /// 消息存储写入或读取失败（StoreError），本次提交中止且不广播
    #[error("message store error: {0}")]
    Store(RepositoryError),
    /// 房间目录、身份存储等其他仓储失败
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    #[error("connection {0} is not registered")]
    NotConnected(ConnectionId),
    #[error("authentication failed")]
    Authentication,
    /// 非房间成员或非管理员操作房间（AuthorizationError），在任何状态变更前拒绝
    #[error("not authorized for room {room_id}")]
    Authorization { room_id: RoomId },
    #[error("room {0} not found")]
    RoomNotFound(RoomId),
}

impl ApplicationError {
    pub fn authorization(room_id: RoomId) -> Self {
        Self::Authorization { room_id }
    }

    /// 面向客户端的稳定错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ApplicationError::Domain(DomainError::ValidationError { .. }) => "VALIDATION_ERROR",
            ApplicationError::Domain(DomainError::ResourceAlreadyExists { .. }) => "ALREADY_EXISTS",
            ApplicationError::Store(_) => "STORE_ERROR",
            ApplicationError::Repository(_) => "REPOSITORY_ERROR",
            ApplicationError::Password(_) => "PASSWORD_ERROR",
            ApplicationError::NotConnected(_) => "NOT_CONNECTED",
            ApplicationError::Authentication => "AUTHENTICATION_FAILED",
            ApplicationError::Authorization { .. } => "AUTHORIZATION_ERROR",
            ApplicationError::RoomNotFound(_) => "ROOM_NOT_FOUND",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ApplicationError::Domain(err) if err.is_validation())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}
