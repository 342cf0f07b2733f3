//! ---
//! ems_section: "02-device-telemetry"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Power-meter decoding and snapshot pipeline."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Raw bytes flow through [`decode`], feed a [`RollingAverage`], and come out
//! as a [`Snapshot`]. [`PowerMeter`] wires those steps to a
//! [`RegisterTransport`] for one device.

pub mod constants;
pub mod decoder;
pub mod errors;
pub mod meter;
pub mod profile;
pub mod rolling;
pub mod snapshot;
pub mod transport;

pub use constants::ScalingConstant;
pub use decoder::{decode, InstantaneousValues, RawRegisterBlock};
pub use errors::{MeterError, Result, TransportError};
pub use meter::{MeterInfo, PowerMeter, PowerMeterBuilder};
pub use profile::{DeviceProfile, Field, FieldSpec, RegisterRange, Signedness};
pub use rolling::{RollingAverage, AVERAGE_WINDOW};
pub use snapshot::{default_tension, mean_line_voltage, SnapRecord, Snapshot, TensionFn};
pub use transport::{read_ranges, ClientFactory, ClientOptions, RegisterTransport};
