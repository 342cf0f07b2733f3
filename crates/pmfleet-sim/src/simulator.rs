//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "In-memory holding-register simulator with fault injection."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pmfleet_meter::{RegisterTransport, TransportError};
use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::registers::{seeded_windows, RegisterWindow};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SimulatorError {
    #[error("ERR_ADDRESS_INVALID: no register window serves {quantity} register(s) at {address}")]
    AddressInvalid { address: u16, quantity: u16 },
    #[error("simulated device is offline")]
    Offline,
}

impl From<SimulatorError> for TransportError {
    fn from(err: SimulatorError) -> Self {
        match err {
            SimulatorError::AddressInvalid { .. } => TransportError::Exception(err.to_string()),
            SimulatorError::Offline => TransportError::Io(err.to_string()),
        }
    }
}

/// One entry of the request log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterRequest {
    pub address: u16,
    pub quantity: u16,
    /// Bytes served, `None` when the read was refused.
    pub served: Option<usize>,
}

#[derive(Debug)]
struct SimulatorState {
    windows: Vec<RegisterWindow>,
    requests: Vec<RegisterRequest>,
    offline: bool,
    latency: Duration,
}

impl SimulatorState {
    fn seeded() -> Self {
        Self {
            windows: seeded_windows(),
            requests: Vec::new(),
            offline: false,
            latency: Duration::ZERO,
        }
    }

    fn read(&mut self, address: u16, quantity: u16) -> Result<Bytes, SimulatorError> {
        let result = if self.offline {
            Err(SimulatorError::Offline)
        } else {
            self.windows
                .iter()
                .find(|window| window.covers(address, quantity))
                .map(|window| window.slice(address, quantity))
                .ok_or(SimulatorError::AddressInvalid { address, quantity })
        };
        self.requests.push(RegisterRequest {
            address,
            quantity,
            served: result.as_ref().ok().map(Bytes::len),
        });
        result
    }
}

/// Serves the PM180 register windows from memory.
///
/// Each `new()` owns its own register state. Clones are handles onto the same
/// state, so a test can keep one to mutate registers while a meter owns another.
#[derive(Debug, Clone)]
pub struct RegisterBlockSimulator {
    state: Arc<Mutex<SimulatorState>>,
}

impl Default for RegisterBlockSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBlockSimulator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimulatorState::seeded())),
        }
    }

    /// Return `quantity * 2` bytes starting at `address`.
    pub async fn read(&self, address: u16, quantity: u16) -> Result<Bytes, SimulatorError> {
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let result = self.state.lock().read(address, quantity);
        trace!(address, quantity, ok = result.is_ok(), "simulated register read");
        result
    }

    pub fn write_register(&self, address: u16, raw: u16) -> Result<(), SimulatorError> {
        let mut state = self.state.lock();
        let written = state
            .windows
            .iter_mut()
            .any(|window| window.set(address, raw));
        if written {
            Ok(())
        } else {
            Err(SimulatorError::AddressInvalid {
                address,
                quantity: 1,
            })
        }
    }

    pub fn register(&self, address: u16) -> Option<u16> {
        self.state
            .lock()
            .windows
            .iter()
            .find_map(|window| window.get(address))
    }

    /// Restore seeded register values. Fault settings and the request log
    /// are cleared as well.
    pub fn reset(&self) {
        *self.state.lock() = SimulatorState::seeded();
    }

    pub fn requests(&self) -> Vec<RegisterRequest> {
        self.state.lock().requests.clone()
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }
}

#[async_trait]
impl RegisterTransport for RegisterBlockSimulator {
    async fn read_holding_registers(
        &self,
        address: u16,
        quantity: u16,
    ) -> Result<Bytes, TransportError> {
        Ok(self.read(address, quantity).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_register_read_returns_window_offset() {
        let sim = RegisterBlockSimulator::new();
        let bytes = sim.read(258, 1).await.unwrap();
        assert_eq!(bytes.as_ref(), &6890u16.to_be_bytes());

        let whole = sim.read(257, 6).await.unwrap();
        assert_eq!(&whole[2..4], bytes.as_ref());
    }

    #[tokio::test]
    async fn addresses_outside_windows_are_invalid() {
        let sim = RegisterBlockSimulator::new();
        assert_eq!(
            sim.read(280, 1).await.unwrap_err(),
            SimulatorError::AddressInvalid {
                address: 280,
                quantity: 1
            }
        );
        assert!(sim.read(256, 6).await.is_err());
        assert!(sim.read(272, 8).await.is_err());
        assert!(sim.read(296, 0).await.is_err());
    }

    #[tokio::test]
    async fn reset_restores_seeded_values() {
        let sim = RegisterBlockSimulator::new();
        sim.write_register(276, 1234).unwrap();
        assert_eq!(sim.register(276), Some(1234));
        sim.reset();
        assert_eq!(sim.register(276), Some(6034));
        assert!(sim.requests().is_empty());
    }

    #[tokio::test]
    async fn instances_do_not_share_registers() {
        let a = RegisterBlockSimulator::new();
        let b = RegisterBlockSimulator::new();
        a.write_register(257, 1).unwrap();
        assert_eq!(b.register(257), Some(6888));
        let handle = a.clone();
        assert_eq!(handle.register(257), Some(1));
    }

    #[tokio::test]
    async fn writes_outside_windows_are_rejected() {
        let sim = RegisterBlockSimulator::new();
        assert!(sim.write_register(280, 1).is_err());
    }

    #[tokio::test]
    async fn request_log_records_outcomes() {
        let sim = RegisterBlockSimulator::new();
        sim.read(296, 6).await.unwrap();
        sim.read(400, 1).await.unwrap_err();
        assert_eq!(
            sim.requests(),
            vec![
                RegisterRequest {
                    address: 296,
                    quantity: 6,
                    served: Some(12)
                },
                RegisterRequest {
                    address: 400,
                    quantity: 1,
                    served: None
                },
            ]
        );
    }

    #[tokio::test]
    async fn offline_maps_to_io_transport_error() {
        let sim = RegisterBlockSimulator::new();
        sim.set_offline(true);
        let err = sim.read_holding_registers(257, 6).await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
        sim.set_offline(false);
        assert!(sim.read_holding_registers(257, 6).await.is_ok());
    }
}
