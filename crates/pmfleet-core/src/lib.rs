//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Fleet orchestrator: one poll loop per power meter plus periodic aggregation.

pub mod connector;
pub mod orchestrator;
pub mod state;

#[cfg(feature = "simulation")]
pub use connector::SimulatorConnector;
pub use connector::{connect_meter, SharedConnector, TransportConnector};
pub use orchestrator::{FleetHandle, FleetOrchestrator, FleetReport, PollOnceReport};
pub use state::{EntryInfo, FleetEntry, FleetState, LastPoll};
