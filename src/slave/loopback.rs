use async_trait::async_trait;
use log::debug;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::handler::RequestHandler;
use crate::modbus::transport::Transport;
use crate::utils::error::ModbusError;

/// In-process bus: every frame sent is handed to the simulated devices and
/// any reply is queued for the next `receive`. Silence is reported as an
/// immediate timeout rather than waiting out the deadline.
pub struct LoopbackTransport {
    handler: RequestHandler,
    replies: Mutex<VecDeque<Vec<u8>>>,
}

impl LoopbackTransport {
    pub fn new(handler: RequestHandler) -> Self {
        Self {
            handler,
            replies: Mutex::new(VecDeque::new()),
        }
    }

    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, frame: &[u8]) -> Result<(), ModbusError> {
        debug!("📤 TX [loopback]: {}", hex::encode(frame));
        if let Some(reply) = self.handler.handle(frame) {
            self.replies.lock().map_err(|_| ModbusError::LockError)?.push_back(reply);
        }
        Ok(())
    }

    async fn receive(&self, _timeout: Duration) -> Result<Vec<u8>, ModbusError> {
        let reply = self.replies.lock().map_err(|_| ModbusError::LockError)?.pop_front();
        match reply {
            Some(frame) => {
                debug!("📥 RX [loopback]: {}", hex::encode(&frame));
                Ok(frame)
            }
            None => Err(ModbusError::Timeout),
        }
    }

    async fn clear(&self) -> Result<(), ModbusError> {
        self.replies.lock().map_err(|_| ModbusError::LockError)?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::protocol::encode_read_request;
    use crate::slave::{RegisterBank, SlaveAddressTable};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reply_only_for_known_device() {
        let table = SlaveAddressTable::build(&[1], |_| RegisterBank::new(vec![7])).unwrap();
        let bus = LoopbackTransport::new(RequestHandler::new(Arc::new(table)));

        bus.send(&encode_read_request(1, 0, 1)).await.unwrap();
        assert!(bus.receive(Duration::from_millis(10)).await.is_ok());

        bus.send(&encode_read_request(9, 0, 1)).await.unwrap();
        assert!(matches!(bus.receive(Duration::from_millis(10)).await, Err(ModbusError::Timeout)));
    }
}
