use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use crate::modbus::client::ModbusClientTrait;
use crate::modbus::protocol::{is_valid_slave_id, SlaveId, MAX_SLAVE_ID, MIN_SLAVE_ID};

pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_millis(10);

/// Discovers responsive devices by probing each candidate ID in turn with
/// a one-register read. Probes are strictly sequential.
pub struct BusScanner {
    client: Arc<dyn ModbusClientTrait>,
    probe_address: u16,
    timeout: Duration,
}

impl BusScanner {
    pub fn new(client: Arc<dyn ModbusClientTrait>) -> Self {
        Self {
            client,
            probe_address: 0,
            timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_probe_address(mut self, address: u16) -> Self {
        self.probe_address = address;
        self
    }

    pub fn default_range() -> RangeInclusive<SlaveId> {
        MIN_SLAVE_ID..=MAX_SLAVE_ID
    }

    /// IDs that returned a well-formed reply. Timeouts and malformed replies
    /// just mean "not here"; IDs outside 1..=247 are skipped.
    pub async fn scan(&self, range: RangeInclusive<SlaveId>) -> BTreeSet<SlaveId> {
        info!("🔍 Scanning for devices on addresses {}..={}", range.start(), range.end());
        let mut found = BTreeSet::new();

        for id in range.filter(|id| is_valid_slave_id(*id)) {
            match self.client.read_holding_registers(id, self.probe_address, 1, self.timeout).await {
                Ok(_) => {
                    info!("✅ Detected slave ID: {}", id);
                    found.insert(id);
                }
                Err(e) if e.is_absent_device() => debug!("📵 Device {} not responding: {}", id, e),
                Err(e) => warn!("⚠️  Probe of device {} failed: {}", id, e),
            }
        }

        info!(
            "📊 Scan complete: [{}]",
            found.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
        );
        found
    }
}
