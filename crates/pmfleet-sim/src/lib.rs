//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Simulator module exports."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Register-block test double for the PM180 power meter.

pub mod registers;
pub mod simulator;

pub use registers::{seeded_windows, RegisterWindow};
pub use simulator::{RegisterBlockSimulator, RegisterRequest, SimulatorError};
