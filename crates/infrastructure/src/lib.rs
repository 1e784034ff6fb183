//! 基础设施层实现。
//!
//! 提供消息存储、房间目录、身份存储的内存与 PostgreSQL 实现，
//! 以及密码哈希和词典情感分类器等适配器，实现应用/领域层定义的接口。

pub mod builder;
pub mod classifier;
pub mod memory;
pub mod migrations;
pub mod password;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureError};
pub use classifier::LexiconClassifier;
pub use memory::{InMemoryIdentityStore, InMemoryMessageStore, InMemoryRoomDirectory};
pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{
    create_pg_pool, PgIdentityStore, PgMessageStore, PgRoomDirectory, PgStorage,
};
