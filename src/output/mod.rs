pub mod formatters;
pub mod telemetry;

pub use formatters::{format_reading, TelemetryPayload};
pub use telemetry::{LogSink, TelemetrySink};
#[cfg(feature = "mqtt")]
pub use telemetry::MqttTelemetry;
