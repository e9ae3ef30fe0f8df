//! Register decoding and scaled drive measurements.

use crate::config::DriveRegister;
use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

/// Timestamp layout used for console output.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Combine two registers into a 32-bit value, first register high.
pub fn decode(high: u16, low: u16) -> u32 {
    ((high as u32) << 16) | (low as u32)
}

/// Decode a register pair returned by the drive.
///
/// Returns `None` unless exactly two registers are present.
pub fn decode_pair(registers: &[u16]) -> Option<u32> {
    match registers {
        [high, low] => Some(decode(*high, *low)),
        _ => None,
    }
}

/// Apply the fixed decimal scale of a register to its raw value.
pub fn scale(raw: u32, register: DriveRegister) -> f64 {
    raw as f64 / register.scale()
}

/// One set of drive output values taken in a single poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    /// Local wall-clock time at the start of the cycle.
    #[serde(rename = "time", serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,

    /// Output frequency in Hz.
    #[serde(rename = "output_frequency_hz")]
    pub output_frequency: f64,

    /// Output current in A.
    #[serde(rename = "output_current_a")]
    pub output_current: f64,

    /// Output voltage in V.
    #[serde(rename = "output_voltage_v")]
    pub output_voltage: f64,
}

impl Measurement {
    /// Build a measurement from the three raw register values.
    pub fn from_raw(timestamp: NaiveDateTime, frequency: u32, current: u32, voltage: u32) -> Self {
        Self {
            timestamp,
            output_frequency: scale(frequency, DriveRegister::OutputFrequency),
            output_current: scale(current, DriveRegister::OutputCurrent),
            output_voltage: scale(voltage, DriveRegister::OutputVoltage),
        }
    }

    /// Scaled value for a register.
    pub fn value(&self, register: DriveRegister) -> f64 {
        match register {
            DriveRegister::OutputFrequency => self.output_frequency,
            DriveRegister::OutputCurrent => self.output_current,
            DriveRegister::OutputVoltage => self.output_voltage,
        }
    }

    /// Timestamp rendered as `YYYY-MM-DD HH:MM:SS`.
    pub fn formatted_time(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

fn serialize_timestamp<S: Serializer>(
    timestamp: &NaiveDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&timestamp.format(TIMESTAMP_FORMAT))
}
