use sqlx::migrate::Migrator;

/// 嵌入式迁移，目录位于工作区根的 `migrations/`
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
