use std::collections::BTreeMap;
use std::sync::Arc;

use super::bank::RegisterBank;
use crate::modbus::protocol::{is_valid_slave_id, SlaveId};
use crate::utils::error::ModbusError;

/// Simulated devices keyed by slave ID. The key set is fixed at
/// construction; the banks behind it refresh independently.
#[derive(Debug, Default)]
pub struct SlaveAddressTable {
    banks: BTreeMap<SlaveId, Arc<RegisterBank>>,
}

impl SlaveAddressTable {
    /// Build one bank per ID from `init`. Rejects IDs outside 1..=247.
    pub fn build<F>(ids: &[SlaveId], mut init: F) -> Result<Self, ModbusError>
    where
        F: FnMut(SlaveId) -> RegisterBank,
    {
        let mut banks = BTreeMap::new();
        for &id in ids {
            if !is_valid_slave_id(id) {
                return Err(ModbusError::InvalidSlaveId(id));
            }
            banks.entry(id).or_insert_with(|| Arc::new(init(id)));
        }
        Ok(Self { banks })
    }

    pub fn resolve(&self, slave_id: SlaveId) -> Result<&Arc<RegisterBank>, ModbusError> {
        self.banks.get(&slave_id).ok_or(ModbusError::NotFound(slave_id))
    }

    pub fn ids(&self) -> Vec<SlaveId> {
        self.banks.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlaveId, &Arc<RegisterBank>)> {
        self.banks.iter().map(|(id, bank)| (*id, bank))
    }

    pub fn len(&self) -> usize {
        self.banks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }
}
