//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Errors raised while building the specs table."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StatsError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("spec set '{0}' is not registered")]
    UnknownSpecSet(String),
    #[error("spec set '{0}' is registered twice")]
    DuplicateSpecSet(String),
}
