use application::{PasswordHasher, PasswordHasherError};
use async_trait::async_trait;
use bcrypt::{hash, verify, BcryptError, DEFAULT_COST};
use domain::PasswordHash;

/// bcrypt 哈希，计算放在阻塞线程池上执行
#[derive(Clone)]
pub struct BcryptPasswordHasher {
    cost: u32,
}

impl BcryptPasswordHasher {
    pub fn new(cost: Option<u32>) -> Self {
        Self {
            cost: cost.unwrap_or(DEFAULT_COST),
        }
    }
}

// 在阻塞线程池上执行 bcrypt，两层错误都折叠成同一种 PasswordHasherError
async fn run_blocking<T, F>(
    job: F,
    wrap: fn(String) -> PasswordHasherError,
) -> Result<T, PasswordHasherError>
where
    F: FnOnce() -> Result<T, BcryptError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|err| wrap(err.to_string()))?
        .map_err(|err| wrap(err.to_string()))
}

#[async_trait]
impl PasswordHasher for BcryptPasswordHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        let cost = self.cost;
        let plaintext = plaintext.to_owned();
        let hashed = run_blocking(move || hash(plaintext, cost), PasswordHasherError::Hash).await?;
        PasswordHash::new(hashed).map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        let plaintext = plaintext.to_owned();
        let hashed = hashed.as_str().to_owned();
        run_blocking(move || verify(plaintext, &hashed), PasswordHasherError::Verify).await
    }
}

impl Default for BcryptPasswordHasher {
    fn default() -> Self {
        Self::new(Some(DEFAULT_COST))
    }
}
