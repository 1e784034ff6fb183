//! 领域模型错误定义
//!
//! 定义领域校验错误和仓储错误，提供清晰的错误上下文。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 验证错误
    #[error("验证失败: {field}: {message}")]
    ValidationError { field: String, message: String },

    /// 资源已存在错误
    #[error("资源已存在: {resource_type} {identifier}")]
    ResourceAlreadyExists {
        resource_type: String,
        identifier: String,
    },
}

impl DomainError {
    /// 创建验证错误
    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建资源已存在错误
    pub fn resource_already_exists(
        resource_type: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self::ResourceAlreadyExists {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError { .. })
    }
}

/// 仓储层错误。消息存储失败（StoreError）也以此类型上报。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    Conflict,
    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

impl From<DomainError> for RepositoryError {
    fn from(value: DomainError) -> Self {
        // 持久化数据无法还原为领域对象，视为存储损坏
        Self::storage(value.to_string())
    }
}
