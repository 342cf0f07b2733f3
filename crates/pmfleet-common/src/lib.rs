//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the fleet runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Shared primitives for the power-meter fleet workspace.
//! This crate exposes configuration loading and tracing initialisation
//! consumed by the orchestrator and the daemon.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, DeviceConfig, FleetConfig, LoadedAppConfig, LoggingConfig, MetricsConfig,
    TransportKind,
};
pub use logging::{init_tracing, LogFormat};
