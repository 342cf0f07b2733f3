//! ---
//! ems_section: "02-device-telemetry"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Scaling constants for PM180 register codes."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Linear scaling between raw register codes and engineering units.
//!
//! Every scaled field shares the raw code range `[RAW_LO, RAW_HI]`; only the
//! engineering range differs per quantity.

/// Lowest raw code emitted by the meter for scaled fields.
pub const RAW_LO: f64 = 0.0;
/// Highest raw code emitted by the meter for scaled fields.
pub const RAW_HI: f64 = 9999.0;

/// Engineering low of the power family (kW, kvar, kVA).
pub const ENG_LO: f64 = -108682.56;
/// Engineering high of the power family.
pub const ENG_HI: f64 = 108682.56;

/// Engineering low of the power-factor family.
pub const LO_ENG: f64 = -1.0;
/// Engineering high of the power-factor family.
pub const HI_ENG: f64 = 1.0;

pub const VOLTAGE_ENG_HI: f64 = 45360.0;
pub const CURRENT_ENG_HI: f64 = 1198.0;

/// A multiplier derived once from an (engineering, raw) range pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingConstant {
    pub ratio: f64,
}

impl ScalingConstant {
    /// `(eng_hi - eng_lo) / (raw_hi - raw_lo)`.
    pub const fn from_ranges(eng_lo: f64, eng_hi: f64, raw_lo: f64, raw_hi: f64) -> Self {
        Self {
            ratio: (eng_hi - eng_lo) / (raw_hi - raw_lo),
        }
    }

    /// Range pair against the shared raw code range.
    pub const fn from_engineering(eng_lo: f64, eng_hi: f64) -> Self {
        Self::from_ranges(eng_lo, eng_hi, RAW_LO, RAW_HI)
    }

    pub const fn fixed(ratio: f64) -> Self {
        Self { ratio }
    }
}

pub const POWER: ScalingConstant = ScalingConstant::from_engineering(ENG_LO, ENG_HI);
pub const POWER_FACTOR: ScalingConstant = ScalingConstant::from_engineering(LO_ENG, HI_ENG);
pub const VOLTAGE: ScalingConstant = ScalingConstant::from_engineering(0.0, VOLTAGE_ENG_HI);
pub const CURRENT: ScalingConstant = ScalingConstant::from_engineering(0.0, CURRENT_ENG_HI);
pub const THD: ScalingConstant = ScalingConstant::fixed(0.001);

pub const POWER_MULTIPLIER: f64 = POWER.ratio;
pub const POWER_FACTOR_MULTIPLIER: f64 = POWER_FACTOR.ratio;
pub const VOLTAGE_MULTIPLIER: f64 = VOLTAGE.ratio;
pub const CURRENT_MULTIPLIER: f64 = CURRENT.ratio;
pub const THD_MULTIPLIER: f64 = THD.ratio;

/// kW → W for the real import power field.
pub const KILO: f64 = 1000.0;
