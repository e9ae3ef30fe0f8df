//! Console output for measurements and connection status.

use crate::config::DriveRegister;
use crate::measurement::Measurement;
use std::fmt::Display;
use std::io::{self, Write};

/// Measurement output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Four labelled lines and a blank line per cycle.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Printed once the serial link to the drive is open.
pub const CONNECTED: &str = "Connected to FR-E700 Mitsubishi";
/// Printed when the serial link cannot be opened.
pub const CONNECT_FAILED: &str = "Failed to connect to FR-E700 Mitsubishi";
/// Printed when Ctrl-C stops the poll loop.
pub const INTERRUPTED: &str = "Process interrupted by user.";
/// Printed after the link is closed.
pub const CLOSED: &str = "Connection closed.";

/// Line oriented sink for everything the monitor prints.
///
/// Every write is flushed so output shows up immediately when piped.
pub struct ConsoleSink<W: Write> {
    writer: W,
    format: OutputFormat,
}

impl ConsoleSink<io::Stdout> {
    /// Sink writing to standard output.
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write> ConsoleSink<W> {
    /// Sink writing to any writer, e.g. a `Vec<u8>` in tests.
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self { writer, format }
    }

    /// Print one measurement.
    pub fn measurement(&mut self, measurement: &Measurement) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => {
                writeln!(self.writer, "Time: {}", measurement.formatted_time())?;
                for register in DriveRegister::ALL {
                    writeln!(
                        self.writer,
                        "{}: {:?} {}",
                        register.label(),
                        measurement.value(register),
                        register.unit()
                    )?;
                }
                writeln!(self.writer)?;
            }
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.writer, measurement)?;
                writeln!(self.writer)?;
            }
        }
        self.writer.flush()
    }

    /// Announce a successful connection.
    pub fn connected(&mut self) -> io::Result<()> {
        self.line(CONNECTED)
    }

    /// Report that the connection could not be established.
    pub fn connect_failed(&mut self) -> io::Result<()> {
        self.line(CONNECT_FAILED)
    }

    /// Report that the user stopped the monitor.
    pub fn interrupted(&mut self) -> io::Result<()> {
        self.line(INTERRUPTED)
    }

    /// Report the error that ended the poll loop.
    pub fn fatal(&mut self, error: &dyn Display) -> io::Result<()> {
        self.line(&format!("Error: {}", error))
    }

    /// Report that the link has been closed.
    pub fn closed(&mut self) -> io::Result<()> {
        self.line(CLOSED)
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.writer, "{}", text)?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn measurement() -> Measurement {
        let timestamp = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        Measurement::from_raw(timestamp, 77824, 1250, 2400)
    }

    #[test]
    fn test_text_measurement() {
        let mut out = Vec::new();
        ConsoleSink::new(&mut out, OutputFormat::Text)
            .measurement(&measurement())
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Time: 2024-03-01 14:30:00\n\
             Output Frequency: 778.24 Hz\n\
             Output Current: 12.5 A\n\
             Output Voltage: 240.0 V\n\
             \n"
        );
    }

    #[test]
    fn test_text_keeps_fraction_on_whole_numbers() {
        let timestamp = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut out = Vec::new();
        ConsoleSink::new(&mut out, OutputFormat::Text)
            .measurement(&Measurement::from_raw(timestamp, 0, 100, 0))
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Output Frequency: 0.0 Hz\n"));
        assert!(text.contains("Output Current: 1.0 A\n"));
        assert!(text.contains("Output Voltage: 0.0 V\n"));
    }

    #[test]
    fn test_json_measurement() {
        let mut out = Vec::new();
        ConsoleSink::new(&mut out, OutputFormat::Json)
            .measurement(&measurement())
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);

        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["time"], "2024-03-01 14:30:00");
        assert_eq!(value["output_frequency_hz"], 778.24);
        assert_eq!(value["output_voltage_v"], 240.0);
    }

    #[test]
    fn test_status_lines() {
        let mut out = Vec::new();
        let mut sink = ConsoleSink::new(&mut out, OutputFormat::Json);
        sink.connected().unwrap();
        sink.fatal(&"port vanished").unwrap();
        sink.interrupted().unwrap();
        sink.closed().unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Connected to FR-E700 Mitsubishi\n\
             Error: port vanished\n\
             Process interrupted by user.\n\
             Connection closed.\n"
        );
    }
}
