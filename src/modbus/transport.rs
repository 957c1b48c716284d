use async_trait::async_trait;
use log::{debug, error, info};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::settings::{ParityConfig, SerialConfig};
use crate::utils::error::ModbusError;

/// Upper bound on a single RTU frame.
pub const MAX_FRAME_LEN: usize = 256;

/// Byte-stream link to the bus. One call to `receive` yields one frame.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, frame: &[u8]) -> Result<(), ModbusError>;

    /// Wait up to `timeout` for the first byte of a frame. Returns
    /// `ModbusError::Timeout` when nothing arrives.
    async fn receive(&self, timeout: Duration) -> Result<Vec<u8>, ModbusError>;

    /// Drop anything already buffered on the line.
    async fn clear(&self) -> Result<(), ModbusError> {
        Ok(())
    }
}

/// RS-485 adapter driven through the `serialport` crate.
pub struct SerialTransport {
    port: Arc<Mutex<Box<dyn SerialPort>>>,
    frame_gap: Duration,
    name: String,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> Result<Self, ModbusError> {
        info!("🔌 Opening RS-485 port: {}", config.port);
        info!(
            "⚙️  Configuration: {} baud, 8 data bits, 1 stop bit, parity {:?}",
            config.baud_rate, config.parity
        );

        let serial_parity = match config.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };
        let frame_gap = inter_frame_gap(config.baud_rate);

        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(frame_gap)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serial_parity)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", config.port, e);
                ModbusError::ConnectionError(format!("Failed to open port {}: {}", config.port, e))
            })?;

        info!("✅ RS-485 port {} open (frame gap {:?})", config.port, frame_gap);
        Ok(Self {
            port: Arc::new(Mutex::new(port)),
            frame_gap,
            name: config.port.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Silence marking the end of an RTU frame: 3.5 characters of 11 bits,
/// never below 2 ms.
pub fn inter_frame_gap(baud_rate: u32) -> Duration {
    let micros = 38_500_000u64 / u64::from(baud_rate.max(1));
    Duration::from_micros(micros).max(Duration::from_millis(2))
}

/// Collect one frame: wait up to `timeout` for the first byte, then read
/// until the line stays quiet for `gap` or `MAX_FRAME_LEN` bytes arrive.
fn read_frame<R: Read + ?Sized>(port: &mut R, timeout: Duration, gap: Duration) -> Result<Vec<u8>, ModbusError> {
    let deadline = Instant::now() + timeout;
    let mut frame = Vec::new();
    let mut buffer = [0u8; MAX_FRAME_LEN];
    let mut last_byte_at: Option<Instant> = None;

    loop {
        match port.read(&mut buffer) {
            Ok(n) if n > 0 => {
                frame.extend_from_slice(&buffer[..n]);
                last_byte_at = Some(Instant::now());
                if frame.len() >= MAX_FRAME_LEN {
                    break;
                }
            }
            Ok(_) => {}
            Err(ref e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => return Err(ModbusError::CommunicationError(format!("Read failed: {}", e))),
        }

        match last_byte_at {
            Some(at) if at.elapsed() >= gap => break,
            Some(_) => {}
            None if Instant::now() >= deadline => return Err(ModbusError::Timeout),
            None => {}
        }
    }

    Ok(frame)
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&self, frame: &[u8]) -> Result<(), ModbusError> {
        debug!("📤 TX [{}]: {}", self.name, hex::encode(frame));
        let port = self.port.clone();
        let frame = frame.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut port = port.lock().map_err(|_| ModbusError::LockError)?;
            port.write_all(&frame)
                .map_err(|e| ModbusError::CommunicationError(format!("Write failed: {}", e)))?;
            port.flush()
                .map_err(|e| ModbusError::CommunicationError(format!("Flush failed: {}", e)))
        })
        .await
        .map_err(|e| ModbusError::CommunicationError(format!("Serial task failed: {}", e)))?
    }

    async fn receive(&self, timeout: Duration) -> Result<Vec<u8>, ModbusError> {
        let port = self.port.clone();
        let gap = self.frame_gap;

        let frame = tokio::task::spawn_blocking(move || {
            let mut port = port.lock().map_err(|_| ModbusError::LockError)?;
            read_frame(&mut **port, timeout, gap)
        })
        .await
        .map_err(|e| ModbusError::CommunicationError(format!("Serial task failed: {}", e)))??;

        debug!("📥 RX [{}]: {}", self.name, hex::encode(&frame));
        Ok(frame)
    }

    async fn clear(&self) -> Result<(), ModbusError> {
        let port = self.port.lock().map_err(|_| ModbusError::LockError)?;
        port.clear(serialport::ClearBuffer::Input)
            .map_err(|e| ModbusError::CommunicationError(format!("Clear failed: {}", e)))
    }
}
