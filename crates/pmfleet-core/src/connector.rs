//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Opening register transports and meters for configured devices."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use pmfleet_common::DeviceConfig;
use pmfleet_meter::{ClientOptions, DeviceProfile, PowerMeter, RegisterTransport};
use tracing::warn;

/// Opens the byte source for one device.
pub trait TransportConnector: Send + Sync {
    fn connect(&self, device_id: &str, device: &DeviceConfig) -> Result<Box<dyn RegisterTransport>>;
}

pub type SharedConnector = Arc<dyn TransportConnector>;

/// Build a meter for `device`, or `None` when its endpoint is incomplete.
pub fn connect_meter(
    connector: &dyn TransportConnector,
    device_id: &str,
    device: &DeviceConfig,
) -> Result<Option<PowerMeter>> {
    let Some(unit_id) = device.unit_id.filter(|_| device.is_connectable()) else {
        warn!(
            device = device_id,
            address = %device.address,
            port = device.port,
            "skipping device without address, port or unit id"
        );
        return Ok(None);
    };
    let transport = connector
        .connect(device_id, device)
        .with_context(|| format!("failed to connect device {device_id}"))?;
    let options = ClientOptions {
        address: device.address.clone(),
        port: device.port,
        unit_id,
        timeout: device.timeout,
    };
    let meter = PowerMeter::builder(DeviceProfile::pm180(), options)
        .client_factory(move |_| transport)
        .collect_snaps_interval(device.collect_snaps_interval)
        .build()
        .with_context(|| format!("failed to build meter for device {device_id}"))?;
    Ok(Some(meter))
}

#[cfg(feature = "simulation")]
pub use simulated::SimulatorConnector;

#[cfg(feature = "simulation")]
mod simulated {
    use indexmap::IndexMap;
    use parking_lot::Mutex;
    use pmfleet_common::TransportKind;
    use pmfleet_sim::RegisterBlockSimulator;
    use tracing::debug;

    use super::*;

    /// Gives every device its own seeded simulator. Handles stay reachable
    /// through [`SimulatorConnector::simulator`] for fault injection.
    #[derive(Debug, Default)]
    pub struct SimulatorConnector {
        simulators: Mutex<IndexMap<String, RegisterBlockSimulator>>,
    }

    impl SimulatorConnector {
        pub fn new() -> Self {
            Self::default()
        }

        /// Handle onto the simulator serving `device_id`, once connected.
        pub fn simulator(&self, device_id: &str) -> Option<RegisterBlockSimulator> {
            self.simulators.lock().get(device_id).cloned()
        }
    }

    impl TransportConnector for SimulatorConnector {
        fn connect(
            &self,
            device_id: &str,
            device: &DeviceConfig,
        ) -> Result<Box<dyn RegisterTransport>> {
            match device.transport {
                TransportKind::Simulator => {
                    let sim = self
                        .simulators
                        .lock()
                        .entry(device_id.to_owned())
                        .or_insert_with(RegisterBlockSimulator::new)
                        .clone();
                    debug!(device = device_id, "simulator attached");
                    Ok(Box::new(sim))
                }
            }
        }
    }
}

#[cfg(all(test, feature = "simulation"))]
mod tests {
    use super::*;

    fn device(unit_id: Option<u8>) -> DeviceConfig {
        DeviceConfig {
            address: "10.0.0.20".into(),
            unit_id,
            ..DeviceConfig::default()
        }
    }

    #[test]
    fn incomplete_endpoints_are_skipped() {
        let connector = SimulatorConnector::new();
        assert!(connect_meter(&connector, "pm-1", &device(None))
            .unwrap()
            .is_none());
        assert!(connector.simulator("pm-1").is_none());
    }

    #[test]
    fn each_device_gets_its_own_simulator() {
        let connector = SimulatorConnector::new();
        let meter = connect_meter(&connector, "pm-1", &device(Some(3)))
            .unwrap()
            .unwrap();
        connect_meter(&connector, "pm-2", &device(Some(4))).unwrap();
        assert_eq!(meter.select_info().unit_id, 3);

        let a = connector.simulator("pm-1").unwrap();
        let b = connector.simulator("pm-2").unwrap();
        a.write_register(257, 1).unwrap();
        assert_eq!(b.register(257), Some(6888));
    }
}
