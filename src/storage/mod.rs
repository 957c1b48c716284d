use async_trait::async_trait;

use crate::modbus::protocol::SlaveId;
use crate::output::telemetry::LogSink;

#[cfg(feature = "sqlite")]
pub mod models;
#[cfg(feature = "sqlite")]
pub mod sqlite_manager;

#[cfg(feature = "sqlite")]
pub use models::Rs485Reading;
#[cfg(feature = "sqlite")]
pub use sqlite_manager::SqliteManager;

/// Persistent record of readings. Best-effort: implementations log their
/// own failures.
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn record(&self, slave_id: SlaveId, value: f32);
    fn sink_type(&self) -> &str;
}

#[async_trait]
impl StorageSink for LogSink {
    async fn record(&self, slave_id: SlaveId, value: f32) {
        log::debug!("💾 (storage disabled) slave {} data {}", slave_id, value);
    }

    fn sink_type(&self) -> &str {
        "log"
    }
}
