use chrono::{DateTime, Utc};
use log::{info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::modbus::client::ModbusClientTrait;
use crate::modbus::protocol::SlaveId;
use crate::modbus::registers::registers_to_floats;
use crate::output::telemetry::TelemetrySink;
use crate::storage::StorageSink;
use crate::utils::error::ModbusError;

/// Outcome of one pass over the device list.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    pub readings: Vec<(SlaveId, Vec<f32>)>,
    pub failures: Vec<(SlaveId, ModbusError)>,
}

impl CycleReport {
    pub fn succeeded(&self) -> Vec<SlaveId> {
        self.readings.iter().map(|(id, _)| *id).collect()
    }

    pub fn failed(&self) -> Vec<SlaveId> {
        self.failures.iter().map(|(id, _)| *id).collect()
    }
}

/// Reads each known device once per tick and forwards the decoded values
/// to telemetry and storage.
pub struct PollingCycle {
    client: Arc<dyn ModbusClientTrait>,
    telemetry: Arc<dyn TelemetrySink>,
    storage: Arc<dyn StorageSink>,
    slave_ids: Vec<SlaveId>,
    register_start: u16,
    register_count: u16,
    timeout: Duration,
}

impl PollingCycle {
    pub fn new(
        client: Arc<dyn ModbusClientTrait>,
        telemetry: Arc<dyn TelemetrySink>,
        storage: Arc<dyn StorageSink>,
        slave_ids: Vec<SlaveId>,
    ) -> Self {
        Self {
            client,
            telemetry,
            storage,
            slave_ids,
            register_start: 0,
            register_count: 2,
            timeout: Duration::from_millis(1000),
        }
    }

    pub fn with_registers(mut self, start: u16, count: u16) -> Self {
        self.register_start = start;
        self.register_count = count;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn slave_ids(&self) -> &[SlaveId] {
        &self.slave_ids
    }

    async fn poll_device(&self, slave_id: SlaveId) -> Result<Vec<f32>, ModbusError> {
        let registers = self
            .client
            .read_holding_registers(slave_id, self.register_start, self.register_count, self.timeout)
            .await?;
        registers_to_floats(&registers)
    }

    /// One pass, in list order. A failing device is recorded and skipped;
    /// there are no retries within a pass.
    pub async fn run_once(&self) -> CycleReport {
        let mut report = CycleReport {
            started_at: Some(Utc::now()),
            ..CycleReport::default()
        };

        for &slave_id in &self.slave_ids {
            match self.poll_device(slave_id).await {
                Ok(values) => {
                    info!("[slave {}] data: {:?}", slave_id, values);
                    for &value in &values {
                        self.telemetry.publish(slave_id, value).await;
                        self.storage.record(slave_id, value).await;
                    }
                    report.readings.push((slave_id, values));
                }
                Err(e) => {
                    warn!("📵 slave {} error: {}", slave_id, e);
                    report.failures.push((slave_id, e));
                }
            }
        }

        report
    }

    /// Run a pass every `period` until `shutdown` resolves. A pass that
    /// overruns the period delays the next tick instead of bunching ticks.
    pub async fn run_until<F>(&self, period: Duration, shutdown: F) -> (u64, u64)
    where
        F: Future<Output = ()>,
    {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut successful_reads = 0u64;
        let mut failed_reads = 0u64;

        info!(
            "🔄 Polling devices [{}] every {:?}",
            self.slave_ids.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", "),
            period
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("🛑 Stopping polling loop");
                    break;
                }
                _ = timer.tick() => {
                    let report = self.run_once().await;
                    successful_reads += report.readings.len() as u64;
                    failed_reads += report.failures.len() as u64;

                    let total = successful_reads + failed_reads;
                    if total > 0 {
                        let success_rate = (successful_reads as f64 / total as f64) * 100.0;
                        info!("📈 Success rate: {:.1}% ({}/{})", success_rate, successful_reads, total);
                    }
                }
            }
        }

        (successful_reads, failed_reads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::modbus::ModbusClient;
    use crate::slave::{LoopbackTransport, RegisterBank, RequestHandler, SlaveAddressTable};

    #[derive(Default)]
    struct Recorder {
        published: Mutex<Vec<(SlaveId, f32)>>,
        recorded: Mutex<Vec<(SlaveId, f32)>>,
    }

    #[async_trait]
    impl TelemetrySink for Recorder {
        async fn publish(&self, slave_id: SlaveId, value: f32) {
            self.published.lock().unwrap().push((slave_id, value));
        }

        fn sink_type(&self) -> &str {
            "recorder"
        }
    }

    #[async_trait]
    impl StorageSink for Recorder {
        async fn record(&self, slave_id: SlaveId, value: f32) {
            self.recorded.lock().unwrap().push((slave_id, value));
        }

        fn sink_type(&self) -> &str {
            "recorder"
        }
    }

    fn cycle_over(table: SlaveAddressTable, ids: Vec<SlaveId>) -> (PollingCycle, Arc<Recorder>) {
        let bus = LoopbackTransport::new(RequestHandler::new(Arc::new(table)));
        let client = Arc::new(ModbusClient::new(Arc::new(bus)));
        let recorder = Arc::new(Recorder::default());
        let cycle = PollingCycle::new(client, recorder.clone(), recorder.clone(), ids);
        (cycle, recorder)
    }

    #[tokio::test]
    async fn test_cycle_forwards_decoded_values_in_order() {
        let table = SlaveAddressTable::build(&[1, 2], |id| RegisterBank::from_floats(&[id as f32 * 10.0])).unwrap();
        let (cycle, recorder) = cycle_over(table, vec![2, 1]);

        let report = cycle.run_once().await;
        assert_eq!(report.succeeded(), vec![2, 1]);
        assert!(report.failures.is_empty());
        assert_eq!(*recorder.published.lock().unwrap(), vec![(2, 20.0), (1, 10.0)]);
        assert_eq!(*recorder.recorded.lock().unwrap(), vec![(2, 20.0), (1, 10.0)]);
    }

    #[tokio::test]
    async fn test_failing_device_does_not_stop_cycle() {
        let table = SlaveAddressTable::build(&[1, 3], |_| RegisterBank::from_floats(&[42.0])).unwrap();
        let (cycle, recorder) = cycle_over(table, vec![1, 2, 3]);

        let report = cycle.run_once().await;
        assert_eq!(report.succeeded(), vec![1, 3]);
        assert_eq!(report.failed(), vec![2]);
        assert!(matches!(report.failures[0].1, ModbusError::Timeout));
        assert_eq!(recorder.published.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_multi_value_devices() {
        let table = SlaveAddressTable::build(&[4], |_| RegisterBank::from_floats(&[1.0, 2.0, 3.0])).unwrap();
        let (cycle, recorder) = cycle_over(table, vec![4]);
        let cycle = cycle.with_registers(0, 6);

        let report = cycle.run_once().await;
        assert_eq!(report.readings, vec![(4, vec![1.0, 2.0, 3.0])]);
        assert_eq!(*recorder.recorded.lock().unwrap(), vec![(4, 1.0), (4, 2.0), (4, 3.0)]);
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let table = SlaveAddressTable::build(&[1], |_| RegisterBank::from_floats(&[5.0])).unwrap();
        let (cycle, _recorder) = cycle_over(table, vec![1]);

        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        let (ok, failed) = cycle.run_until(Duration::from_millis(10), shutdown).await;
        assert!(ok >= 1);
        assert_eq!(failed, 0);
    }
}
