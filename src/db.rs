use crate::auth::hash_password;
use crate::config::AdminAccount;
use crate::dao;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

/// Single connection that never idles out, so an in-memory database lives as long as the pool.
pub async fn create_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!().run(pool).await
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Hashing admin password failed: {0}")]
    Hash(argon2::password_hash::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub async fn seed_admin(pool: &SqlitePool, admin: &AdminAccount) -> Result<bool, SeedError> {
    let password_hash = hash_password(&admin.password).map_err(SeedError::Hash)?;
    let created = dao::insert_admin_if_absent(pool, &admin.username, &password_hash).await?;
    if created {
        tracing::info!("Created admin account {}", admin.username);
    } else {
        tracing::debug!("Admin account {} already exists", admin.username);
    }
    Ok(created)
}
