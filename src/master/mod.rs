//! Bus master: discovery and periodic polling.

pub mod polling;
pub mod scanner;

pub use polling::{CycleReport, PollingCycle};
pub use scanner::BusScanner;
