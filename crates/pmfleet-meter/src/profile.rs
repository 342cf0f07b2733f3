//! ---
//! ems_section: "02-device-telemetry"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Device profiles describing register ranges and field layouts."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! A [`DeviceProfile`] is plain data: which register ranges to read, in which
//! order, and how each 16-bit word of the concatenated payload maps onto an
//! engineering value. Behaviour is selected by passing a different profile,
//! not by specialising the meter type.

use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter};

use crate::constants::{
    ScalingConstant, CURRENT, ENG_LO, KILO, LO_ENG, POWER, POWER_FACTOR, THD, VOLTAGE,
};

/// Named instantaneous readings produced by the PM180 layout.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display, AsRefStr, EnumIter,
)]
pub enum Field {
    #[strum(serialize = "voltage_v1_v12_v")]
    #[serde(rename = "voltage_v1_v12_v")]
    VoltageV1V12,
    #[strum(serialize = "voltage_v2_v23_v")]
    #[serde(rename = "voltage_v2_v23_v")]
    VoltageV2V23,
    #[strum(serialize = "voltage_v3_v31_v")]
    #[serde(rename = "voltage_v3_v31_v")]
    VoltageV3V31,
    #[strum(serialize = "current_i1_a")]
    #[serde(rename = "current_i1_a")]
    CurrentI1,
    #[strum(serialize = "current_i2_a")]
    #[serde(rename = "current_i2_a")]
    CurrentI2,
    #[strum(serialize = "current_i3_a")]
    #[serde(rename = "current_i3_a")]
    CurrentI3,
    #[strum(serialize = "power_factor_l1")]
    #[serde(rename = "power_factor_l1")]
    PowerFactorL1,
    #[strum(serialize = "power_factor_l2")]
    #[serde(rename = "power_factor_l2")]
    PowerFactorL2,
    #[strum(serialize = "power_factor_l3")]
    #[serde(rename = "power_factor_l3")]
    PowerFactorL3,
    #[strum(serialize = "real_import_power_w")]
    #[serde(rename = "real_import_power_w")]
    RealImportPower,
    #[strum(serialize = "reactive_power_k_var")]
    #[serde(rename = "reactive_power_k_var")]
    ReactivePower,
    #[strum(serialize = "apparent_import_power_kva")]
    #[serde(rename = "apparent_import_power_kva")]
    ApparentImportPower,
    #[strum(serialize = "voltage_1_2_thd")]
    #[serde(rename = "voltage_1_2_thd")]
    Voltage12Thd,
    #[strum(serialize = "voltage_2_3_thd")]
    #[serde(rename = "voltage_2_3_thd")]
    Voltage23Thd,
    #[strum(serialize = "voltage_3_1_thd")]
    #[serde(rename = "voltage_3_1_thd")]
    Voltage31Thd,
    #[strum(serialize = "current_i1_thd")]
    #[serde(rename = "current_i1_thd")]
    CurrentI1Thd,
    #[strum(serialize = "current_i2_thd")]
    #[serde(rename = "current_i2_thd")]
    CurrentI2Thd,
    #[strum(serialize = "current_i3_thd")]
    #[serde(rename = "current_i3_thd")]
    CurrentI3Thd,
}

/// Two's-complement or plain 16-bit interpretation of a register word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Signedness {
    Signed,
    Unsigned,
}

impl Signedness {
    /// Read one big-endian word.
    pub fn read_be(self, word: [u8; 2]) -> f64 {
        match self {
            Signedness::Signed => f64::from(i16::from_be_bytes(word)),
            Signedness::Unsigned => f64::from(u16::from_be_bytes(word)),
        }
    }
}

/// Decoding rule for a single word of the payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub field: Field,
    /// Byte offset within the concatenated payload.
    pub offset: usize,
    pub signedness: Signedness,
    pub scale: ScalingConstant,
    /// Engineering-low added after scaling; zero for ranges starting at zero.
    pub eng_offset: f64,
    /// Unit conversion applied after clamping.
    pub post_scale: f64,
}

impl FieldSpec {
    const fn new(field: Field, offset: usize, signedness: Signedness, scale: ScalingConstant) -> Self {
        Self {
            field,
            offset,
            signedness,
            scale,
            eng_offset: 0.0,
            post_scale: 1.0,
        }
    }

    const fn offset_by(self, eng_offset: f64) -> Self {
        Self { eng_offset, ..self }
    }

    const fn then_scale(self, post_scale: f64) -> Self {
        Self { post_scale, ..self }
    }

    /// Scale a raw code into a non-negative engineering value.
    pub fn apply(&self, raw: f64) -> f64 {
        ((raw * self.scale.ratio) + self.eng_offset).max(0.0) * self.post_scale
    }

    pub fn width(&self) -> usize {
        2
    }
}

/// Contiguous holding-register window, inclusive of `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterRange {
    pub start: u16,
    pub quantity: u16,
}

impl RegisterRange {
    pub const fn new(start: u16, quantity: u16) -> Self {
        Self { start, quantity }
    }

    /// Last address covered by the range, capped at `u16::MAX`.
    pub fn end(&self) -> u16 {
        self.start.saturating_add(self.quantity.saturating_sub(1))
    }

    pub fn byte_len(&self) -> usize {
        usize::from(self.quantity) * 2
    }
}

/// Everything the pipeline needs to know about one meter model.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub thing_type: String,
    pub tags: Vec<String>,
    pub ranges: Vec<RegisterRange>,
    pub fields: Vec<FieldSpec>,
    /// Minimum payload length accepted by the decoder.
    pub payload_len: usize,
    /// Field fed into the rolling average.
    pub power_field: Field,
    /// Phase-to-phase voltages handed to the tension calculation.
    pub line_voltage_fields: [Field; 3],
}

pub const PM180_RANGES: [RegisterRange; 3] = [
    RegisterRange::new(257, 6),
    RegisterRange::new(272, 7),
    RegisterRange::new(296, 6),
];

pub const PM180_FIELDS: [FieldSpec; 18] = {
    use Field::*;
    use Signedness::{Signed, Unsigned};
    [
        FieldSpec::new(VoltageV1V12, 0, Signed, VOLTAGE),
        FieldSpec::new(VoltageV2V23, 2, Unsigned, VOLTAGE),
        FieldSpec::new(VoltageV3V31, 4, Signed, VOLTAGE),
        FieldSpec::new(CurrentI1, 6, Signed, CURRENT),
        FieldSpec::new(CurrentI2, 8, Unsigned, CURRENT),
        FieldSpec::new(CurrentI3, 10, Signed, CURRENT),
        FieldSpec::new(PowerFactorL1, 12, Signed, POWER_FACTOR).offset_by(LO_ENG),
        FieldSpec::new(PowerFactorL2, 14, Signed, POWER_FACTOR).offset_by(LO_ENG),
        FieldSpec::new(PowerFactorL3, 16, Signed, POWER_FACTOR).offset_by(LO_ENG),
        // offset 18 (register 275) is read but unused
        FieldSpec::new(RealImportPower, 20, Signed, POWER)
            .offset_by(ENG_LO)
            .then_scale(KILO),
        FieldSpec::new(ReactivePower, 22, Unsigned, POWER).offset_by(ENG_LO),
        FieldSpec::new(ApparentImportPower, 24, Signed, POWER).offset_by(ENG_LO),
        FieldSpec::new(Voltage12Thd, 26, Unsigned, THD),
        FieldSpec::new(Voltage23Thd, 28, Unsigned, THD),
        FieldSpec::new(Voltage31Thd, 30, Unsigned, THD),
        FieldSpec::new(CurrentI1Thd, 32, Unsigned, THD),
        FieldSpec::new(CurrentI2Thd, 34, Unsigned, THD),
        FieldSpec::new(CurrentI3Thd, 36, Unsigned, THD),
    ]
};

pub const PM180_PAYLOAD_LEN: usize = 38;

impl DeviceProfile {
    /// SATEC PM180 rack power meter.
    pub fn pm180() -> Self {
        Self {
            thing_type: "powermeter-satec-pm180".to_owned(),
            tags: vec!["satec".to_owned()],
            ranges: PM180_RANGES.to_vec(),
            fields: PM180_FIELDS.to_vec(),
            payload_len: PM180_PAYLOAD_LEN,
            power_field: Field::RealImportPower,
            line_voltage_fields: [Field::VoltageV1V12, Field::VoltageV2V23, Field::VoltageV3V31],
        }
    }

    /// Bytes returned by reading every range once.
    pub fn block_len(&self) -> usize {
        self.ranges.iter().map(RegisterRange::byte_len).sum()
    }

    pub fn field(&self, field: Field) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.field == field)
    }
}
