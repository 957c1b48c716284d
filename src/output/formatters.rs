use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::modbus::protocol::SlaveId;
use crate::utils::error::ModbusError;

/// Telemetry message body: `{"slave_id": 2, "data": 42.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub slave_id: SlaveId,
    pub data: f32,
}

impl TelemetryPayload {
    pub fn new(slave_id: SlaveId, data: f32) -> Self {
        Self { slave_id, data }
    }

    pub fn to_json(&self) -> Result<String, ModbusError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Human-readable line for console output.
pub fn format_reading(slave_id: SlaveId, value: f32, at: DateTime<Utc>) -> String {
    format!("[{}] slave {:>3} data: {:.4}", at.format("%Y-%m-%d %H:%M:%S"), slave_id, value)
}
