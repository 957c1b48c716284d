use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::modbus::registers::{floats_to_registers, Register};
use crate::utils::error::ModbusError;

/// Holding registers of one simulated device.
///
/// Contents are an immutable snapshot behind an atomic pointer. Readers
/// load one snapshot per request; refreshes and writes publish a whole new
/// snapshot, so a reader never sees a half-updated bank.
#[derive(Debug)]
pub struct RegisterBank {
    registers: ArcSwap<Vec<Register>>,
}

impl RegisterBank {
    pub fn new(initial: Vec<Register>) -> Self {
        Self {
            registers: ArcSwap::from_pointee(initial),
        }
    }

    pub fn from_floats(values: &[f32]) -> Self {
        Self::new(floats_to_registers(values))
    }

    pub fn len(&self) -> usize {
        self.registers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Arc<Vec<Register>> {
        self.registers.load_full()
    }

    /// Copy out `count` registers from `start`. Fails without returning
    /// anything when the range runs past the end of the bank.
    pub fn read(&self, start: u16, count: u16) -> Result<Vec<Register>, ModbusError> {
        let snapshot = self.registers.load();
        let begin = start as usize;
        let end = begin + count as usize;
        if end > snapshot.len() {
            return Err(ModbusError::OutOfRange { start, count });
        }
        Ok(snapshot[begin..end].to_vec())
    }

    /// Swap in a wholly new register set.
    pub fn replace(&self, registers: Vec<Register>) {
        self.registers.store(Arc::new(registers));
    }

    pub fn replace_floats(&self, values: &[f32]) {
        self.replace(floats_to_registers(values));
    }

    /// Copy-on-write update of a single register.
    /// The bound is checked against the snapshot being replaced, so a
    /// concurrent shrink turns the write into `OutOfRange`, never a lost write.
    pub fn write(&self, address: u16, value: Register) -> Result<(), ModbusError> {
        let index = address as usize;
        let mut in_range = false;
        self.registers.rcu(|current| {
            in_range = index < current.len();
            if !in_range {
                return Arc::clone(current);
            }
            let mut next = Vec::clone(current);
            next[index] = value;
            Arc::new(next)
        });
        if in_range {
            Ok(())
        } else {
            Err(ModbusError::OutOfRange { start: address, count: 1 })
        }
    }
}
