//! Modbus RTU over RS-485: a polling master that discovers devices and
//! forwards their float readings, and a simulator that answers as a set
//! of slave devices.

pub mod cli;
pub mod config;
pub mod master;
pub mod modbus;
pub mod output;
pub mod services;
pub mod slave;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use master::{BusScanner, CycleReport, PollingCycle};
pub use modbus::{ModbusClient, ModbusClientTrait, SerialTransport, Transport};
pub use services::{MasterService, SlaveService};
pub use slave::{LoopbackTransport, RegisterBank, RequestHandler, SlaveAddressTable};
pub use utils::error::{FrameError, ModbusError};

#[cfg(feature = "sqlite")]
pub use storage::{Rs485Reading, SqliteManager};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
