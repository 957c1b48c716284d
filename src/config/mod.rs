pub mod settings;

pub use settings::{Config, DatabaseConfig, MasterConfig, MqttConfig, ParityConfig, SerialConfig, SlaveConfig};
