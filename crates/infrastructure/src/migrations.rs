use sqlx::migrate::Migrator;

/// 仓库根目录下 `migrations/` 中的建表脚本
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
