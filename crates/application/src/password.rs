use async_trait::async_trait;
use domain::{DomainError, PasswordHash};
use thiserror::Error;

/// 明文密码最短长度
pub const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Debug, Error)]
pub enum PasswordHasherError {
    #[error("hash error: {0}")]
    Hash(String),
    #[error("verify error: {0}")]
    Verify(String),
}

impl PasswordHasherError {
    pub fn hash_error(message: impl Into<String>) -> Self {
        Self::Hash(message.into())
    }

    pub fn verify_error(message: impl Into<String>) -> Self {
        Self::Verify(message.into())
    }
}

/// 密码哈希适配器，实现方需把 CPU 密集的计算移出异步执行器。
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError>;
    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError>;
}

/// 注册时的明文密码校验
pub fn check_plaintext(plaintext: &str) -> Result<(), DomainError> {
    if plaintext.chars().count() < MIN_PASSWORD_CHARS {
        return Err(DomainError::validation_error(
            "password",
            format!("must be at least {MIN_PASSWORD_CHARS} characters"),
        ));
    }
    Ok(())
}
