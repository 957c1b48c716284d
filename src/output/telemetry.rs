use async_trait::async_trait;
use chrono::Utc;
use log::info;

use super::formatters::format_reading;
use crate::modbus::protocol::SlaveId;

/// Outbound telemetry channel. Fire-and-forget: implementations log their
/// own failures and never report back to the caller.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn publish(&self, slave_id: SlaveId, value: f32);
    fn sink_type(&self) -> &str;
}

/// Writes readings to the log. Stands in for telemetry or storage when
/// those are disabled.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl TelemetrySink for LogSink {
    async fn publish(&self, slave_id: SlaveId, value: f32) {
        info!("📈 {}", format_reading(slave_id, value, Utc::now()));
    }

    fn sink_type(&self) -> &str {
        "log"
    }
}

#[cfg(feature = "mqtt")]
pub use mqtt::MqttTelemetry;

#[cfg(feature = "mqtt")]
mod mqtt {
    use async_trait::async_trait;
    use log::{debug, error, info, warn};
    use rumqttc::{AsyncClient, ClientError, MqttOptions, QoS};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    use super::TelemetrySink;
    use crate::config::settings::MqttConfig;
    use crate::modbus::protocol::SlaveId;
    use crate::output::formatters::TelemetryPayload;
    use crate::utils::error::ModbusError;

    /// Publishes JSON readings to an MQTT broker. The connection event loop
    /// runs on its own task and reconnects on the next poll after an error.
    pub struct MqttTelemetry {
        client: AsyncClient,
        topic: String,
        qos: QoS,
        event_loop: JoinHandle<()>,
    }

    impl MqttTelemetry {
        pub fn connect(config: &MqttConfig) -> Result<Self, ModbusError> {
            if config.broker.is_empty() {
                return Err(ModbusError::TelemetryError("MQTT broker address is empty".to_string()));
            }

            let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
            options.set_keep_alive(Duration::from_secs(30));
            if let Some(token) = config.access_token.as_deref().filter(|t| !t.is_empty()) {
                options.set_credentials(token, "");
            }

            let (client, mut event_loop) = AsyncClient::new(options, 64);
            let broker = format!("mqtt://{}:{}", config.broker, config.port);
            info!("📻 MQTT telemetry → {} topic '{}'", broker, config.topic);

            let handle = tokio::spawn(async move {
                loop {
                    match event_loop.poll().await {
                        Ok(event) => debug!("MQTT event: {:?}", event),
                        Err(e) => {
                            error!("❌ MQTT error ({}): {}", broker, e);
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });

            Ok(Self {
                client,
                topic: config.topic.clone(),
                qos: qos_from_level(config.qos),
                event_loop: handle,
            })
        }
    }

    fn qos_from_level(level: u8) -> QoS {
        match level {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        }
    }

    impl Drop for MqttTelemetry {
        fn drop(&mut self) {
            self.event_loop.abort();
        }
    }

    #[async_trait]
    impl TelemetrySink for MqttTelemetry {
        async fn publish(&self, slave_id: SlaveId, value: f32) {
            let payload = match TelemetryPayload::new(slave_id, value).to_json() {
                Ok(p) => p,
                Err(e) => {
                    warn!("⚠️  Cannot encode telemetry for slave {}: {}", slave_id, e);
                    return;
                }
            };
            // Never wait on the request queue: it stops draining while the
            // broker is unreachable.
            match self.client.try_publish(&self.topic, self.qos, false, payload.clone()) {
                Ok(()) => debug!("📻 Published: {}", payload),
                Err(ClientError::TryRequest(_)) => {
                    warn!("⚠️  MQTT queue full, dropped reading from slave {}", slave_id)
                }
                Err(e) => error!("❌ MQTT publish failed for slave {}: {}", slave_id, e),
            }
        }

        fn sink_type(&self) -> &str {
            "mqtt"
        }
    }

}
