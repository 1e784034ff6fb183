use std::sync::Arc;

use application::{PasswordHasher, SentimentClassifier};
use config::{AppConfig, StorageBackend};
use domain::{IdentityStore, MessageStore, RoomDirectory};
use thiserror::Error;
use tracing::info;

use crate::{
    classifier::LexiconClassifier,
    memory::{InMemoryIdentityStore, InMemoryMessageStore, InMemoryRoomDirectory},
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("sentiment lexicon error: {0}")]
    Lexicon(String),
    #[error("configuration error: {0}")]
    Config(String),
}

/// 按配置装配好的外部协作方
#[derive(Clone)]
pub struct Infrastructure {
    pub message_store: Arc<dyn MessageStore>,
    pub room_directory: Arc<dyn RoomDirectory>,
    pub identity_store: Arc<dyn IdentityStore>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub classifier: Arc<dyn SentimentClassifier>,
}

impl Infrastructure {
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let password_hasher: Arc<dyn PasswordHasher> =
            Arc::new(BcryptPasswordHasher::new(Some(config.security.bcrypt_cost)));
        let classifier: Arc<dyn SentimentClassifier> = match &config.chat.lexicon_path {
            Some(path) => Arc::new(LexiconClassifier::from_json_file(path)?),
            None => Arc::new(LexiconClassifier::builtin()),
        };

        match config.storage.backend {
            StorageBackend::Memory => {
                info!("using in-memory storage");
                Ok(Self::in_memory(password_hasher, classifier))
            }
            StorageBackend::Postgres => {
                let url = config.storage.database_url.as_deref().ok_or_else(|| {
                    InfrastructureError::Config("storage.database_url is not set".into())
                })?;
                let pool = create_pg_pool(url, config.storage.max_connections).await?;
                MIGRATOR.run(&pool).await?;
                info!("postgres storage ready, migrations applied");

                let storage = PgStorage::new(pool);
                Ok(Self {
                    message_store: Arc::new(storage.message_store),
                    room_directory: Arc::new(storage.room_directory),
                    identity_store: Arc::new(storage.identity_store),
                    password_hasher,
                    classifier,
                })
            }
        }
    }

    /// 全内存装配，供开发模式和测试使用
    pub fn in_memory(
        password_hasher: Arc<dyn PasswordHasher>,
        classifier: Arc<dyn SentimentClassifier>,
    ) -> Self {
        Self {
            message_store: Arc::new(InMemoryMessageStore::new()),
            room_directory: Arc::new(InMemoryRoomDirectory::new()),
            identity_store: Arc::new(InMemoryIdentityStore::new()),
            password_hasher,
            classifier,
        }
    }
}
