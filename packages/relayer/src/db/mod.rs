//! Cursor persistence
//!
//! The only state the relay keeps between invocations is the last processed
//! block per source chain, stored as a decimal string under the chain's
//! storage key.

use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Durable key-value storage for scan cursors
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Last processed block stored under `key`, if any
    async fn load(&self, key: &str) -> Result<Option<u64>>;

    /// Overwrite the cursor under `key`
    async fn save(&self, key: &str, block: u64) -> Result<()>;

    /// Remove the cursor under `key`
    async fn clear(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl<T: CursorStore + ?Sized> CursorStore for &T {
    async fn load(&self, key: &str) -> Result<Option<u64>> {
        (**self).load(key).await
    }

    async fn save(&self, key: &str, block: u64) -> Result<()> {
        (**self).save(key, block).await
    }

    async fn clear(&self, key: &str) -> Result<()> {
        (**self).clear(key).await
    }
}

fn parse_cursor(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| eyre!("Stored cursor {} is not a block number ({:?}): {}", key, raw, e))
}

// ============================================================================
// Postgres
// ============================================================================

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to database")
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("Failed to run database migrations")?;
    Ok(())
}

/// Cursor store backed by the `relay_cursors` table
#[derive(Clone)]
pub struct PgCursorStore {
    pool: PgPool,
}

impl PgCursorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and migrate
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CursorStore for PgCursorStore {
    async fn load(&self, key: &str) -> Result<Option<u64>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"SELECT last_processed_block FROM relay_cursors WHERE storage_key = $1"#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .wrap_err_with(|| format!("Failed to get cursor {}", key))?;

        row.map(|r| parse_cursor(key, &r.0)).transpose()
    }

    async fn save(&self, key: &str, block: u64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO relay_cursors (storage_key, last_processed_block)
            VALUES ($1, $2)
            ON CONFLICT (storage_key) DO UPDATE SET last_processed_block = $2, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(block.to_string())
        .execute(&self.pool)
        .await
        .wrap_err_with(|| format!("Failed to update cursor {} to {}", key, block))?;

        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        sqlx::query(r#"DELETE FROM relay_cursors WHERE storage_key = $1"#)
            .bind(key)
            .execute(&self.pool)
            .await
            .wrap_err_with(|| format!("Failed to clear cursor {}", key))?;

        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local cursor store, used when no database is configured
#[derive(Default)]
pub struct MemoryCursorStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `key = block`
    pub fn with_cursor(key: &str, block: u64) -> Self {
        let mut entries = HashMap::new();
        entries.insert(key.to_string(), block.to_string());
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Raw stored value, as written
    pub async fn raw(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self, key: &str) -> Result<Option<u64>> {
        self.entries
            .read()
            .await
            .get(key)
            .map(|raw| parse_cursor(key, raw))
            .transpose()
    }

    async fn save(&self, key: &str, block: u64) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), block.to_string());
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
