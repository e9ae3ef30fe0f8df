//! Configuration for the FR-E700 monitor.
//!
//! Only the serial device path is chosen at runtime; the framing, unit id,
//! register map and poll interval are fixed by the drive.

use std::time::Duration;
use thiserror::Error;
use tokio_serial::{DataBits, Parity, StopBits};

/// Modbus unit/slave id of the drive.
pub const UNIT_ID: u8 = 1;

/// Number of 16-bit registers read for each quantity.
pub const REGISTER_COUNT: u16 = 2;

/// Delay between two poll cycles.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Serial device used when none is given on the command line.
pub const DEFAULT_PORT: &str = "/dev/ttyUSB1";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Serial framing for the RTU link.
///
/// The drive only talks 9600 baud 8E1, so everything but the port is fixed.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialLinkConfig {
    /// Serial port path (e.g., "/dev/ttyUSB1" or "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Parity
    pub parity: Parity,
    /// Data bits
    pub data_bits: DataBits,
    /// Stop bits
    pub stop_bits: StopBits,
    /// Response timeout for a single request
    pub timeout: Duration,
}

impl Default for SerialLinkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: 9600,
            parity: Parity::Even,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            timeout: Duration::from_millis(2000),
        }
    }
}

impl SerialLinkConfig {
    /// FR-E700 framing on the given port.
    pub fn for_port(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Serial port cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// The three drive quantities read every cycle, in polling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveRegister {
    /// Output frequency (0.01 Hz resolution)
    OutputFrequency,
    /// Output current (0.01 A resolution)
    OutputCurrent,
    /// Output voltage (0.1 V resolution)
    OutputVoltage,
}

impl DriveRegister {
    /// All registers in the order they are polled.
    pub const ALL: [DriveRegister; 3] = [
        DriveRegister::OutputFrequency,
        DriveRegister::OutputCurrent,
        DriveRegister::OutputVoltage,
    ];

    /// Starting holding register address.
    pub fn address(&self) -> u16 {
        match self {
            DriveRegister::OutputFrequency => 0x0200,
            DriveRegister::OutputCurrent => 0x0201,
            DriveRegister::OutputVoltage => 0x0202,
        }
    }

    /// Divisor applied to the raw 32-bit value.
    pub fn scale(&self) -> f64 {
        match self {
            DriveRegister::OutputFrequency | DriveRegister::OutputCurrent => 100.0,
            DriveRegister::OutputVoltage => 10.0,
        }
    }

    /// Unit of measurement.
    pub fn unit(&self) -> &'static str {
        match self {
            DriveRegister::OutputFrequency => "Hz",
            DriveRegister::OutputCurrent => "A",
            DriveRegister::OutputVoltage => "V",
        }
    }

    /// Console label.
    pub fn label(&self) -> &'static str {
        match self {
            DriveRegister::OutputFrequency => "Output Frequency",
            DriveRegister::OutputCurrent => "Output Current",
            DriveRegister::OutputVoltage => "Output Voltage",
        }
    }

    /// Return the string name for this register.
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveRegister::OutputFrequency => "output_frequency",
            DriveRegister::OutputCurrent => "output_current",
            DriveRegister::OutputVoltage => "output_voltage",
        }
    }

    /// Read request for this register.
    pub fn request(&self) -> RegisterReadRequest {
        RegisterReadRequest {
            unit_id: UNIT_ID,
            address: self.address(),
            count: REGISTER_COUNT,
        }
    }
}

/// A single Read Holding Registers request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterReadRequest {
    /// Modbus unit/slave id
    pub unit_id: u8,
    /// Starting address (0-based)
    pub address: u16,
    /// Number of registers to read
    pub count: u16,
}
