use log::{debug, info};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::bank::RegisterBank;
use super::table::SlaveAddressTable;
use crate::modbus::protocol::SlaveId;

/// Produces fresh sensor values for simulated devices.
#[derive(Debug, Clone)]
pub struct SensorSimulator {
    values_per_device: usize,
    max_value: f32,
}

impl SensorSimulator {
    pub fn new(values_per_device: usize, max_value: f32) -> Self {
        Self {
            values_per_device: values_per_device.max(1),
            max_value: if max_value > 0.0 { max_value } else { 100.0 },
        }
    }

    pub fn sample(&self) -> Vec<f32> {
        let mut rng = rand::rng();
        (0..self.values_per_device)
            .map(|_| rng.random_range(0.0..self.max_value))
            .collect()
    }

    pub fn new_bank(&self) -> RegisterBank {
        RegisterBank::from_floats(&self.sample())
    }

    /// Replace every bank in the table with a new sample.
    pub fn refresh(&self, table: &SlaveAddressTable) {
        for (id, bank) in table.iter() {
            let values = self.sample();
            debug!("🔄 Device {} refreshed: {:?}", id, values);
            bank.replace_floats(&values);
        }
    }

    /// Build a table with one freshly sampled bank per ID.
    pub fn build_table(&self, ids: &[SlaveId]) -> Result<SlaveAddressTable, crate::utils::error::ModbusError> {
        SlaveAddressTable::build(ids, |_| self.new_bank())
    }

    /// Refresh all banks every `period` on a background task. The first
    /// refresh happens one full period after spawning.
    pub fn spawn_refresh(self, table: Arc<SlaveAddressTable>, period: Duration) -> JoinHandle<()> {
        info!("⏱️  Refreshing {} simulated devices every {:?}", table.len(), period);
        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer.tick().await;
            loop {
                timer.tick().await;
                self.refresh(&table);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::registers::registers_to_floats;

    #[test]
    fn test_samples_stay_in_range() {
        let sim = SensorSimulator::new(3, 100.0);
        for _ in 0..100 {
            let values = sim.sample();
            assert_eq!(values.len(), 3);
            assert!(values.iter().all(|v| (0.0..100.0).contains(v)));
        }
    }

    #[test]
    fn test_refresh_replaces_every_bank() {
        let sim = SensorSimulator::new(1, 100.0);
        let table = sim.build_table(&[1, 2]).unwrap();
        for (_, bank) in table.iter() {
            bank.replace_floats(&[-1.0]);
        }

        sim.refresh(&table);

        for (_, bank) in table.iter() {
            let values = registers_to_floats(&bank.read(0, 2).unwrap()).unwrap();
            assert!(values[0] >= 0.0);
        }
    }
}
