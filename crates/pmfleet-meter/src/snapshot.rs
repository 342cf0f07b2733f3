//! ---
//! ems_section: "02-device-telemetry"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-poll snapshot assembly and its fleet-facing JSON record."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decoder::InstantaneousValues;
use crate::profile::DeviceProfile;
use crate::rolling::RollingAverage;

/// Derives a line voltage from the three phase-to-phase voltages.
pub type TensionFn = Arc<dyn Fn(f64, f64, f64) -> f64 + Send + Sync>;

/// Arithmetic mean of the three line voltages.
pub fn mean_line_voltage(v12: f64, v23: f64, v31: f64) -> f64 {
    (v12 + v23 + v31) / 3.0
}

pub fn default_tension() -> TensionFn {
    Arc::new(mean_line_voltage)
}

/// One poll's worth of telemetry. Never mutated after assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub instantaneous: InstantaneousValues,
    pub historical_average_w: f64,
    pub derived_voltage_v: f64,
    pub power_w: f64,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    /// Feed the decoded power into `history`, then build the snapshot.
    pub fn assemble(
        profile: &DeviceProfile,
        instantaneous: InstantaneousValues,
        history: &mut RollingAverage,
        tension: &TensionFn,
    ) -> Self {
        let power_w = instantaneous.get(profile.power_field);
        history.store(power_w);
        let [a, b, c] = profile.line_voltage_fields.map(|field| instantaneous.get(field));
        Self {
            instantaneous,
            historical_average_w: history.average(),
            derived_voltage_v: tension(a, b, c),
            power_w,
            timestamp: Utc::now(),
        }
    }

    pub fn to_record(&self) -> SnapRecord {
        SnapRecord {
            success: true,
            stats: SnapStats {
                power_w: self.power_w,
                tension_v: self.derived_voltage_v,
                powermeter_specific: PowermeterSpecific {
                    instantaneous_values: self.instantaneous,
                    historical_values: HistoricalValues {
                        real_import_power_w_last15m_avg: self.historical_average_w,
                    },
                },
            },
            config: Map::new(),
        }
    }

    /// The snapshot as the nested JSON object fleet entries carry.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self.to_record()).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapRecord {
    pub success: bool,
    pub stats: SnapStats,
    #[serde(default)]
    pub config: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapStats {
    pub power_w: f64,
    pub tension_v: f64,
    pub powermeter_specific: PowermeterSpecific,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowermeterSpecific {
    pub instantaneous_values: InstantaneousValues,
    pub historical_values: HistoricalValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalValues {
    pub real_import_power_w_last15m_avg: f64,
}
