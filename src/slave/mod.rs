//! Simulated devices answering on the bus.

pub mod bank;
pub mod handler;
pub mod loopback;
pub mod simulator;
pub mod table;

pub use bank::RegisterBank;
pub use handler::RequestHandler;
pub use loopback::LoopbackTransport;
pub use simulator::SensorSimulator;
pub use table::SlaveAddressTable;
