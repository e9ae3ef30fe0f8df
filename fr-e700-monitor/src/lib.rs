//! Modbus RTU monitor for the Mitsubishi FR-E700 inverter.
//!
//! Polls the drive over a serial link every five seconds and prints its
//! output frequency, current and voltage.
//!
//! # Registers
//!
//! ```text
//! 0x0200  output frequency  (2 registers, /100 -> Hz)
//! 0x0201  output current    (2 registers, /100 -> A)
//! 0x0202  output voltage    (2 registers, /10  -> V)
//! ```
//!
//! Each pair is read with function 0x03 from unit 1 and combined as
//! `(high << 16) | low`.

pub mod config;
pub mod frame;
pub mod link;
pub mod measurement;
pub mod output;
pub mod poller;
pub mod signal;
