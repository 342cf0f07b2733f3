//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Fleet aggregation operators and spec tables."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
pub mod errors;
pub mod operator;
pub mod path;
pub mod powermeter;
pub mod status;
pub mod table;

pub use errors::{Result, StatsError};
pub use operator::{
    group_by, FilterFn, GroupFn, OperatorKind, OperatorOutput, OperatorSpec, Source, StatSummary,
};
pub use path::{resolve, resolve_f64, resolve_key};
pub use powermeter::{
    builtin_specs, powermeter_default, powermeter_overrides, POWERMETER, POWERMETER_DEFAULT,
};
pub use status::{default_classifier, SharedClassifier, SnapStatusClassifier, StatusClassifier};
pub use table::{SpecSet, SpecsTable, SpecsTableBuilder};
