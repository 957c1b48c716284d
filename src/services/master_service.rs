use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;

use crate::config::Config;
use crate::master::{BusScanner, PollingCycle};
use crate::modbus::protocol::SlaveId;
use crate::modbus::{ModbusClient, SerialTransport, Transport};
use crate::output::telemetry::{LogSink, TelemetrySink};
use crate::storage::StorageSink;
use crate::utils::error::ModbusError;

/// Owns the bus master and its collaborators for the life of the process.
pub struct MasterService {
    config: Config,
    client: Arc<ModbusClient>,
    telemetry: Arc<dyn TelemetrySink>,
    storage: Arc<dyn StorageSink>,
    #[cfg(feature = "sqlite")]
    database: Option<crate::storage::SqliteManager>,
}

impl MasterService {
    /// Open the configured serial port and connect the sinks.
    pub async fn new(config: Config) -> Result<Self, ModbusError> {
        let transport = SerialTransport::open(&config.serial)?;
        Self::with_transport(config, Arc::new(transport)).await
    }

    pub async fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self, ModbusError> {
        info!("🚀 Initializing master service");
        config.validate()?;

        let telemetry = build_telemetry(&config);

        #[cfg(feature = "sqlite")]
        let database = if config.database.enabled {
            match crate::storage::SqliteManager::new(&config.database).await {
                Ok(db) => Some(db),
                Err(e) => {
                    error!("❌ Failed to initialize database, readings will not be stored: {}", e);
                    None
                }
            }
        } else {
            info!("📝 Database storage disabled in configuration");
            None
        };

        #[cfg(feature = "sqlite")]
        let storage: Arc<dyn StorageSink> = match &database {
            Some(db) => Arc::new(db.clone()),
            None => Arc::new(LogSink),
        };
        #[cfg(not(feature = "sqlite"))]
        let storage: Arc<dyn StorageSink> = {
            if config.database.enabled {
                warn!("⚠️  Built without sqlite support, database output ignored");
            }
            Arc::new(LogSink)
        };

        info!("📤 Telemetry: {}, storage: {}", telemetry.sink_type(), storage.sink_type());
        Ok(Self {
            config,
            client: Arc::new(ModbusClient::new(transport)),
            telemetry,
            storage,
            #[cfg(feature = "sqlite")]
            database,
        })
    }

    pub fn client(&self) -> Arc<ModbusClient> {
        self.client.clone()
    }

    pub fn scanner(&self) -> BusScanner {
        BusScanner::new(self.client.clone())
            .with_timeout(self.config.master.scan_timeout())
            .with_probe_address(self.config.master.register_start)
    }

    /// Devices to poll: the configured list when present, else a fresh scan.
    pub async fn discover(&self) -> Vec<SlaveId> {
        let master = &self.config.master;
        if !master.slave_ids.is_empty() {
            info!("📋 Using configured slave IDs: {:?}", master.slave_ids);
            return master.slave_ids.clone();
        }
        let found = self.scanner().scan(master.scan_start..=master.scan_end).await;
        found.into_iter().collect()
    }

    pub fn polling_cycle(&self, slave_ids: Vec<SlaveId>) -> PollingCycle {
        PollingCycle::new(self.client.clone(), self.telemetry.clone(), self.storage.clone(), slave_ids)
            .with_registers(self.config.master.register_start, self.config.master.register_count)
            .with_timeout(self.config.master.response_timeout())
    }

    /// Discover devices, then poll them on the configured interval until
    /// `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), ModbusError>
    where
        F: Future<Output = ()>,
    {
        let slave_ids = self.discover().await;
        info!("Detected slave IDs: {:?}", slave_ids);
        if slave_ids.is_empty() {
            warn!("❌ No responsive devices found. Check wiring and device addresses.");
        }

        let cycle = self.polling_cycle(slave_ids);
        let (ok, failed) = cycle.run_until(self.config.master.poll_interval(), shutdown).await;
        info!("📊 Final statistics: {} successful reads, {} failed", ok, failed);

        self.shutdown().await;
        Ok(())
    }

    pub async fn shutdown(&self) {
        #[cfg(feature = "sqlite")]
        if let Some(db) = &self.database {
            db.close().await;
        }
        info!("🛑 Master service stopped");
    }
}

fn build_telemetry(config: &Config) -> Arc<dyn TelemetrySink> {
    if !config.mqtt.enabled {
        return Arc::new(LogSink);
    }

    #[cfg(feature = "mqtt")]
    match crate::output::MqttTelemetry::connect(&config.mqtt) {
        Ok(mqtt) => return Arc::new(mqtt),
        Err(e) => error!("❌ MQTT setup failed, falling back to log output: {}", e),
    }
    #[cfg(not(feature = "mqtt"))]
    warn!("⚠️  Built without MQTT support, telemetry goes to the log");

    Arc::new(LogSink)
}
