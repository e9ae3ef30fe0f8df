//! Drive polling lifecycle: connect, poll loop, teardown.

use crate::config::{DriveRegister, POLL_INTERVAL};
use crate::link::DriveLink;
use crate::measurement::{Measurement, decode_pair};
use crate::output::ConsoleSink;
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Error type for polling operations.
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Modbus exception: {0}")]
    Exception(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("No response within {0:?}")]
    Timeout(Duration),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Unexpected response for {register}: expected 2 registers, got {got}")]
    Decode { register: &'static str, got: usize },
    #[error("Output failed: {0}")]
    Output(#[from] std::io::Error),
}

impl PollerError {
    /// Whether the loop can skip the current cycle and carry on.
    ///
    /// Anything the drive answered badly (or not at all) is recoverable; a
    /// broken port, an undecodable payload or a dead console is not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PollerError::Exception(_) | PollerError::Protocol(_) | PollerError::Timeout(_)
        )
    }
}

/// How the poll loop ended.
#[derive(Debug)]
pub enum Exit {
    /// Stopped by the shutdown signal.
    Interrupted,
    /// Stopped by an unrecoverable error.
    Failed(PollerError),
}

/// Polls one FR-E700 drive over an exclusively owned link.
pub struct DrivePoller<L: DriveLink, W: Write> {
    link: L,
    sink: ConsoleSink<W>,
    interval: Duration,
}

impl<L: DriveLink, W: Write> DrivePoller<L, W> {
    /// Create a poller for an already open link.
    pub fn new(link: L, sink: ConsoleSink<W>) -> Self {
        Self {
            link,
            sink,
            interval: POLL_INTERVAL,
        }
    }

    /// Override the delay between cycles.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Open the link and report the outcome on the sink.
    ///
    /// On failure exactly one line is printed and no poller is built.
    pub async fn connect<F>(open: F, mut sink: ConsoleSink<W>) -> Result<Self, PollerError>
    where
        F: FnOnce() -> Result<L, PollerError>,
    {
        match open() {
            Ok(link) => {
                info!("Connected to drive");
                let status = sink.connected();
                let poller = Self::new(link, sink);
                if let Err(e) = status {
                    poller.shutdown().await;
                    return Err(e.into());
                }
                Ok(poller)
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to drive");
                if let Err(write_err) = sink.connect_failed() {
                    warn!(error = %write_err, "Failed to report connection failure");
                }
                Err(e)
            }
        }
    }

    /// Run the poll loop until `shutdown` resolves or a fatal error occurs,
    /// then close the link. The link is closed exactly once.
    pub async fn serve<S>(mut self, shutdown: S) -> Exit
    where
        S: Future<Output = ()>,
    {
        let exit = match self.run(shutdown).await {
            Ok(()) => {
                info!("Received shutdown signal");
                if let Err(e) = self.sink.interrupted() {
                    warn!(error = %e, "Failed to report interruption");
                }
                Exit::Interrupted
            }
            Err(e) => {
                error!(error = %e, "Polling stopped");
                if let Err(write_err) = self.sink.fatal(&e) {
                    warn!(error = %write_err, "Failed to report polling error");
                }
                Exit::Failed(e)
            }
        };

        self.shutdown().await;
        exit
    }

    /// Poll every interval until `shutdown` resolves.
    ///
    /// The shutdown signal is only observed between cycles. Recoverable read
    /// errors skip the cycle's output but not the following sleep.
    pub async fn run<S>(&mut self, shutdown: S) -> Result<(), PollerError>
    where
        S: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);

        info!(
            interval_secs = self.interval.as_secs_f64(),
            "Starting FR-E700 poller"
        );

        loop {
            match self.poll_cycle().await {
                Ok(measurement) => {
                    debug!(
                        frequency_hz = measurement.output_frequency,
                        current_a = measurement.output_current,
                        voltage_v = measurement.output_voltage,
                        "Poll cycle complete"
                    );
                }
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "Error reading registers, skipping cycle");
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = &mut shutdown => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Perform a single poll cycle and print its measurement.
    ///
    /// All three registers are requested even if an earlier one failed
    /// recoverably; no measurement is built unless every read succeeded.
    pub async fn poll_cycle(&mut self) -> Result<Measurement, PollerError> {
        let timestamp = chrono::Local::now().naive_local();
        let mut raw = [0u32; 3];
        let mut failure = None;

        for (slot, register) in raw.iter_mut().zip(DriveRegister::ALL) {
            match self.read_register(register).await {
                Ok(value) => *slot = value,
                Err(e) if e.is_recoverable() => {
                    debug!(
                        register = register.as_str(),
                        address = register.address(),
                        error = %e,
                        "Register read failed"
                    );
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let [frequency, current, voltage] = raw;
        let measurement = Measurement::from_raw(timestamp, frequency, current, voltage);
        self.sink.measurement(&measurement)?;

        Ok(measurement)
    }

    /// Read and decode one register pair.
    async fn read_register(&mut self, register: DriveRegister) -> Result<u32, PollerError> {
        let registers = self
            .link
            .read_holding_registers(register.request())
            .await?;

        decode_pair(&registers).ok_or(PollerError::Decode {
            register: register.as_str(),
            got: registers.len(),
        })
    }

    /// Close the link and report it.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.link.close().await {
            warn!(error = %e, "Failed to close serial link");
        }
        if let Err(e) = self.sink.closed() {
            warn!(error = %e, "Failed to report closed connection");
        }
        info!("Connection closed");
    }
}
