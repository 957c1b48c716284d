use log::{info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::{Config, SerialConfig, SlaveConfig};
use crate::modbus::{SerialTransport, Transport};
use crate::slave::{RequestHandler, SensorSimulator, SlaveAddressTable};
use crate::utils::error::ModbusError;

const RECEIVE_WINDOW: Duration = Duration::from_secs(1);

/// Simulated devices sharing one serial port.
pub struct SlaveService {
    config: SlaveConfig,
    serial: SerialConfig,
    simulator: SensorSimulator,
    handler: RequestHandler,
}

impl SlaveService {
    pub fn new(config: &Config) -> Result<Self, ModbusError> {
        config.validate()?;
        let slave = config.slave.clone();
        let simulator = SensorSimulator::new(slave.values_per_device, slave.max_value);
        let table = Arc::new(simulator.build_table(&slave.slave_ids)?);
        let handler = RequestHandler::new(table).with_exception_responses(slave.exception_responses);

        info!("🤖 Simulating devices {:?}", handler.table().ids());
        Ok(Self {
            serial: SerialConfig {
                port: slave.port.clone(),
                ..config.serial.clone()
            },
            config: slave,
            simulator,
            handler,
        })
    }

    pub fn table(&self) -> &Arc<SlaveAddressTable> {
        self.handler.table()
    }

    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Start the periodic bank refresh. Abort the handle to stop it.
    pub fn spawn_refresh(&self) -> JoinHandle<()> {
        self.simulator
            .clone()
            .spawn_refresh(self.table().clone(), self.config.refresh_interval())
    }

    /// Open the slave-side port and serve until Ctrl+C.
    pub async fn run(&self) -> Result<u64, ModbusError> {
        let transport = Arc::new(SerialTransport::open(&self.serial)?);
        info!("Modbus started : {}", self.serial.port);
        let served = self
            .serve(transport, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        Ok(served)
    }

    /// Refresh banks on their timer and answer inbound frames until
    /// `shutdown` resolves. Returns the number of replies sent.
    pub async fn serve<F>(&self, transport: Arc<dyn Transport>, shutdown: F) -> Result<u64, ModbusError>
    where
        F: Future<Output = ()>,
    {
        let refresher = self.spawn_refresh();
        tokio::pin!(shutdown);
        let mut replies = 0u64;

        loop {
            let frame = tokio::select! {
                _ = &mut shutdown => break,
                received = transport.receive(RECEIVE_WINDOW) => received,
            };

            match frame {
                Ok(request) => {
                    info!("Request Received: {}", hex::encode(&request));
                    if let Some(response) = self.handler.handle(&request) {
                        match transport.send(&response).await {
                            Ok(()) => {
                                replies += 1;
                                info!("Response Sent (HEX): {}", hex::encode(&response));
                            }
                            Err(e) => warn!("⚠️  Failed to send response: {}", e),
                        }
                    }
                }
                Err(ModbusError::Timeout) => {}
                Err(e) => {
                    warn!("⚠️  Receive error: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }

        refresher.abort();
        info!("🛑 Slave service stopped after {} replies", replies);
        Ok(replies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::protocol::{decode_read_response, encode_read_request};
    use crate::modbus::registers::registers_to_floats;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Feeds queued frames to the service and keeps what it sends back.
    struct WireStub {
        inbound: Mutex<VecDeque<Vec<u8>>>,
        outbound: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl Transport for WireStub {
        async fn send(&self, frame: &[u8]) -> Result<(), ModbusError> {
            self.outbound.lock().unwrap().push(frame.to_vec());
            Ok(())
        }

        async fn receive(&self, timeout: Duration) -> Result<Vec<u8>, ModbusError> {
            let next = self.inbound.lock().unwrap().pop_front();
            match next {
                Some(frame) => Ok(frame),
                None => {
                    tokio::time::sleep(timeout).await;
                    Err(ModbusError::Timeout)
                }
            }
        }
    }

    #[tokio::test]
    async fn test_serve_answers_known_devices_only() {
        let mut config = Config::default();
        config.slave.slave_ids = vec![1, 2];
        let service = SlaveService::new(&config).unwrap();

        let wire = Arc::new(WireStub {
            inbound: Mutex::new(VecDeque::from([
                encode_read_request(1, 0, 2),
                encode_read_request(7, 0, 2),
                vec![0x00, 0x01],
                encode_read_request(2, 0, 2),
            ])),
            outbound: Mutex::new(Vec::new()),
        });

        let replies = service
            .serve(wire.clone(), tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(replies, 2);

        let sent = wire.outbound.lock().unwrap();
        let first = decode_read_response(&sent[0], 1, 2).unwrap();
        let value = registers_to_floats(&first.registers).unwrap()[0];
        assert!((0.0..100.0).contains(&value));
        assert_eq!(sent[1][0], 2);
    }
}
