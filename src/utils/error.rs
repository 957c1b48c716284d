use thiserror::Error;

/// Reason a received frame was rejected. A rejected frame is always
/// discarded whole.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Slave ID mismatch: expected {expected}, got {actual}")]
    SlaveMismatch { expected: u8, actual: u8 },

    #[error("Function code mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    FunctionMismatch { expected: u8, actual: u8 },

    #[error("CRC mismatch: calculated 0x{calculated:04X}, received 0x{received:04X}")]
    CrcMismatch { calculated: u16, received: u16 },

    #[error("Byte count mismatch: expected {expected}, got {actual}")]
    ByteCountMismatch { expected: usize, actual: usize },

    #[error("Device exception: function 0x{function:02X}, code 0x{code:02X}")]
    Exception { function: u8, code: u8 },

    #[error("Echo mismatch in write response")]
    EchoMismatch,
}

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Registers out of range: start {start}, count {count}")]
    OutOfRange { start: u16, count: u16 },

    #[error("Timeout occurred")]
    Timeout,

    #[error("Device not found: address {0}")]
    NotFound(u8),

    #[error("Invalid register sequence length: {0}")]
    InvalidLength(usize),

    #[error("Invalid slave ID: {0} (must be 1-247)")]
    InvalidSlaveId(u8),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Lock acquisition failed")]
    LockError,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Telemetry error: {0}")]
    TelemetryError(String),
}

impl ModbusError {
    /// Errors that mean "nothing usable came back" rather than a broken link.
    pub fn is_absent_device(&self) -> bool {
        matches!(self, ModbusError::Timeout | ModbusError::Frame(_))
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for ModbusError {
    fn from(err: sqlx::Error) -> Self {
        ModbusError::StorageError(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for ModbusError {
    fn from(err: serde_json::Error) -> Self {
        ModbusError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        ModbusError::CommunicationError(format!("IO error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for ModbusError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ModbusError::Timeout
    }
}
