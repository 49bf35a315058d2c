use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::error::Result;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &str) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        // Device credential records. Exactly one of password_hash and
        // public_key is populated; the pair (user_id, device_id) is unique
        // at the storage layer so racing registrations cannot both insert.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                platform TEXT NOT NULL DEFAULT '',
                password_hash TEXT,
                public_key TEXT,
                metadata TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (user_id, device_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Single-use challenge artifacts, keyed by the SHA-256 of the opaque
        // token handed to the client. Redemption deletes the row atomically.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS device_auth_codes (
                token_hash TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                code_challenge TEXT NOT NULL,
                device_id TEXT NOT NULL DEFAULT '',
                interaction_mode TEXT NOT NULL,
                requested_scopes TEXT NOT NULL DEFAULT '',
                subject TEXT NOT NULL,
                created_at TEXT NOT NULL,
                lifetime_secs INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Create indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_devices_device_id ON devices(device_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_devices_user_id ON devices(user_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_device_auth_codes_created_at ON device_auth_codes(created_at)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Database migrations completed");
        Ok(())
    }
}

#[cfg(test)]
impl Database {
    /// In-memory database for tests. A single connection keeps every query
    /// on the same SQLite memory instance.
    pub async fn new_in_memory() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let db = Self { pool };
        db.run_migrations().await.expect("migrations");
        db
    }
}
