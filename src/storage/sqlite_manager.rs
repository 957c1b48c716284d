use async_trait::async_trait;
use chrono::Utc;
use log::{error, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

use super::models::Rs485Reading;
use super::StorageSink;
use crate::config::settings::DatabaseConfig;
use crate::modbus::protocol::SlaveId;
use crate::utils::error::ModbusError;

#[derive(Clone)]
pub struct SqliteManager {
    pool: SqlitePool,
}

impl SqliteManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, ModbusError> {
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ModbusError::StorageError(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        info!("🗄️  Initializing SQLite database: {}", config.path);

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| ModbusError::StorageError(format!("Failed to connect to SQLite: {}", e)))?;

        let manager = Self { pool };
        manager.initialize_schema().await?;

        info!("✅ SQLite database initialized successfully");
        Ok(manager)
    }

    async fn initialize_schema(&self) -> Result<(), ModbusError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rs485 (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slave_id INTEGER NOT NULL,
                data REAL NOT NULL,
                unix_timestamp INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rs485_slave_time ON rs485(slave_id, unix_timestamp)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn insert_reading(&self, slave_id: SlaveId, value: f32) -> Result<i64, ModbusError> {
        let result = sqlx::query("INSERT INTO rs485 (slave_id, data, unix_timestamp) VALUES (?, ?, ?)")
            .bind(i64::from(slave_id))
            .bind(f64::from(value))
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Newest first.
    pub async fn get_recent_readings(&self, limit: i64) -> Result<Vec<Rs485Reading>, ModbusError> {
        let readings = sqlx::query_as::<_, Rs485Reading>(
            "SELECT id, slave_id, data, unix_timestamp FROM rs485 ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(readings)
    }

    pub async fn count_readings(&self, slave_id: SlaveId) -> Result<i64, ModbusError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rs485 WHERE slave_id = ?")
            .bind(i64::from(slave_id))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        info!("🔒 Closing SQLite database connections");
        self.pool.close().await;
    }
}

#[async_trait]
impl StorageSink for SqliteManager {
    async fn record(&self, slave_id: SlaveId, value: f32) {
        match self.insert_reading(slave_id, value).await {
            Ok(_) => info!("💾 Data saved to DB (slave {})", slave_id),
            Err(e) => error!("❌ DB error for slave {}: {}", slave_id, e),
        }
    }

    fn sink_type(&self) -> &str {
        "sqlite"
    }
}
