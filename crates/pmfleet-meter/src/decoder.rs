//! ---
//! ems_section: "02-device-telemetry"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Register block decoding into engineering units."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{MeterError, Result};
use crate::profile::{DeviceProfile, Field};

/// Concatenated big-endian register words read during one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRegisterBlock(Bytes);

impl RawRegisterBlock {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Join per-range reads in range order.
    pub fn concat<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        let mut buffer = BytesMut::new();
        for part in parts {
            buffer.extend_from_slice(&part);
        }
        Self(buffer.freeze())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for RawRegisterBlock {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// The 18 readings of one decode, each clamped to be non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InstantaneousValues {
    pub voltage_v1_v12_v: f64,
    pub voltage_v2_v23_v: f64,
    pub voltage_v3_v31_v: f64,
    pub current_i1_a: f64,
    pub current_i2_a: f64,
    pub current_i3_a: f64,
    pub power_factor_l1: f64,
    pub power_factor_l2: f64,
    pub power_factor_l3: f64,
    pub real_import_power_w: f64,
    pub reactive_power_k_var: f64,
    pub apparent_import_power_kva: f64,
    pub voltage_1_2_thd: f64,
    pub voltage_2_3_thd: f64,
    pub voltage_3_1_thd: f64,
    pub current_i1_thd: f64,
    pub current_i2_thd: f64,
    pub current_i3_thd: f64,
}

impl InstantaneousValues {
    pub fn get(&self, field: Field) -> f64 {
        *self.slot(field)
    }

    fn set(&mut self, field: Field, value: f64) {
        *self.slot_mut(field) = value;
    }

    fn slot(&self, field: Field) -> &f64 {
        match field {
            Field::VoltageV1V12 => &self.voltage_v1_v12_v,
            Field::VoltageV2V23 => &self.voltage_v2_v23_v,
            Field::VoltageV3V31 => &self.voltage_v3_v31_v,
            Field::CurrentI1 => &self.current_i1_a,
            Field::CurrentI2 => &self.current_i2_a,
            Field::CurrentI3 => &self.current_i3_a,
            Field::PowerFactorL1 => &self.power_factor_l1,
            Field::PowerFactorL2 => &self.power_factor_l2,
            Field::PowerFactorL3 => &self.power_factor_l3,
            Field::RealImportPower => &self.real_import_power_w,
            Field::ReactivePower => &self.reactive_power_k_var,
            Field::ApparentImportPower => &self.apparent_import_power_kva,
            Field::Voltage12Thd => &self.voltage_1_2_thd,
            Field::Voltage23Thd => &self.voltage_2_3_thd,
            Field::Voltage31Thd => &self.voltage_3_1_thd,
            Field::CurrentI1Thd => &self.current_i1_thd,
            Field::CurrentI2Thd => &self.current_i2_thd,
            Field::CurrentI3Thd => &self.current_i3_thd,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut f64 {
        match field {
            Field::VoltageV1V12 => &mut self.voltage_v1_v12_v,
            Field::VoltageV2V23 => &mut self.voltage_v2_v23_v,
            Field::VoltageV3V31 => &mut self.voltage_v3_v31_v,
            Field::CurrentI1 => &mut self.current_i1_a,
            Field::CurrentI2 => &mut self.current_i2_a,
            Field::CurrentI3 => &mut self.current_i3_a,
            Field::PowerFactorL1 => &mut self.power_factor_l1,
            Field::PowerFactorL2 => &mut self.power_factor_l2,
            Field::PowerFactorL3 => &mut self.power_factor_l3,
            Field::RealImportPower => &mut self.real_import_power_w,
            Field::ReactivePower => &mut self.reactive_power_k_var,
            Field::ApparentImportPower => &mut self.apparent_import_power_kva,
            Field::Voltage12Thd => &mut self.voltage_1_2_thd,
            Field::Voltage23Thd => &mut self.voltage_2_3_thd,
            Field::Voltage31Thd => &mut self.voltage_3_1_thd,
            Field::CurrentI1Thd => &mut self.current_i1_thd,
            Field::CurrentI2Thd => &mut self.current_i2_thd,
            Field::CurrentI3Thd => &mut self.current_i3_thd,
        }
    }
}

/// Decode a register payload using the profile's field layout.
///
/// `None` stands for "no buffer at all" (for instance a cache that was never
/// filled) and fails with [`MeterError::DataInvalid`]. The length check runs
/// before any field is read, so decoding is all-or-nothing.
pub fn decode(profile: &DeviceProfile, data: Option<&[u8]>) -> Result<InstantaneousValues> {
    let data = data.ok_or(MeterError::DataInvalid)?;
    if data.len() < profile.payload_len {
        return Err(MeterError::DataInsufficient {
            expected: profile.payload_len,
            actual: data.len(),
        });
    }

    let mut values = InstantaneousValues::default();
    for spec in &profile.fields {
        let word = data
            .get(spec.offset..spec.offset + spec.width())
            .and_then(|slice| <[u8; 2]>::try_from(slice).ok())
            .ok_or(MeterError::DataInsufficient {
                expected: spec.offset + spec.width(),
                actual: data.len(),
            })?;
        values.set(spec.field, spec.apply(spec.signedness.read_be(word)));
    }
    debug!(
        power_w = values.real_import_power_w,
        bytes = data.len(),
        "decoded register block"
    );
    Ok(values)
}
