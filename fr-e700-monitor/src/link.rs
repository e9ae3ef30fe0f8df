//! Serial Modbus RTU link to the drive.

use crate::config::{RegisterReadRequest, SerialLinkConfig, UNIT_ID};
use crate::frame::hex;
use crate::poller::PollerError;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{self, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, info};

/// A link able to read holding registers from the drive.
pub trait DriveLink {
    /// Issue one Read Holding Registers request and return the raw registers.
    fn read_holding_registers(
        &mut self,
        request: RegisterReadRequest,
    ) -> impl Future<Output = Result<Vec<u16>, PollerError>>;

    /// Release the underlying transport.
    fn close(&mut self) -> impl Future<Output = io::Result<()>>;
}

/// Modbus RTU client over a serial port.
pub struct RtuLink {
    ctx: Context,
    port: String,
    timeout: Duration,
}

impl RtuLink {
    /// Open the serial port with the configured framing.
    pub fn open(config: &SerialLinkConfig) -> Result<Self, PollerError> {
        let builder = tokio_serial::new(&config.port, config.baud_rate)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .data_bits(config.data_bits)
            .timeout(config.timeout);

        let serial = tokio_serial::SerialStream::open(&builder)
            .map_err(|e| PollerError::Connection(format!("Serial open failed: {}", e)))?;

        info!(
            port = %config.port,
            baud_rate = config.baud_rate,
            parity = ?config.parity,
            data_bits = ?config.data_bits,
            stop_bits = ?config.stop_bits,
            "Serial port opened"
        );

        Ok(Self::attach(serial, &config.port, config.timeout))
    }

    /// Speak Modbus RTU over an already open byte stream.
    ///
    /// `label` only names the transport in log records.
    pub fn attach<T>(transport: T, label: impl Into<String>, timeout: Duration) -> Self
    where
        T: AsyncRead + AsyncWrite + fmt::Debug + Unpin + Send + 'static,
    {
        Self {
            ctx: rtu::attach_slave(InputDrain::new(transport), Slave(UNIT_ID)),
            port: label.into(),
            timeout,
        }
    }
}

impl DriveLink for RtuLink {
    async fn read_holding_registers(
        &mut self,
        request: RegisterReadRequest,
    ) -> Result<Vec<u16>, PollerError> {
        debug!(
            port = %self.port,
            frame = %hex(&request.to_rtu_frame()),
            "Sending read holding registers request"
        );

        self.ctx.set_slave(Slave(request.unit_id));

        let response = tokio::time::timeout(
            self.timeout,
            self.ctx
                .read_holding_registers(request.address, request.count),
        )
        .await
        .map_err(|_| PollerError::Timeout(self.timeout))?;

        match response {
            Ok(Ok(registers)) => {
                debug!(address = request.address, ?registers, "Received registers");
                Ok(registers)
            }
            Ok(Err(exception)) => Err(PollerError::Exception(format!("{:?}", exception))),
            Err(tokio_modbus::Error::Transport(e)) if e.kind() == io::ErrorKind::TimedOut => {
                Err(PollerError::Timeout(self.timeout))
            }
            Err(tokio_modbus::Error::Transport(e)) => Err(PollerError::Transport(e.to_string())),
            Err(e) => Err(PollerError::Protocol(e.to_string())),
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        debug!(port = %self.port, "Closing serial link");
        self.ctx.disconnect().await
    }
}

/// Byte stream that throws away unread input before every write.
///
/// RTU frames carry no transaction id, so a reply that arrives after its
/// request timed out would otherwise be taken as the answer to the next one.
#[derive(Debug)]
struct InputDrain<T> {
    inner: T,
}

impl<T: AsyncRead + Unpin> InputDrain<T> {
    fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Read and drop whatever is already buffered, without waiting.
    fn discard_input(&mut self, cx: &mut task::Context<'_>) -> io::Result<usize> {
        let mut scratch = [0u8; 256];
        let mut discarded = 0;
        loop {
            let mut buf = ReadBuf::new(&mut scratch);
            match Pin::new(&mut self.inner).poll_read(cx, &mut buf) {
                Poll::Ready(Ok(())) if !buf.filled().is_empty() => {
                    discarded += buf.filled().len();
                }
                // Nothing pending, or end of stream.
                Poll::Ready(Ok(())) | Poll::Pending => return Ok(discarded),
                Poll::Ready(Err(e)) => return Err(e),
            }
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for InputDrain<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> AsyncWrite for InputDrain<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match this.discard_input(cx) {
            Ok(0) => {}
            Ok(discarded) => debug!(bytes = discarded, "Discarded stale input"),
            Err(e) => return Poll::Ready(Err(e)),
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriveRegister;
    use crate::frame::rtu_adu;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    const TIMEOUT: Duration = Duration::from_millis(100);

    /// What the simulated drive does with one request.
    enum Reply {
        Frame(Vec<u8>),
        Late(Duration, Vec<u8>),
        Silent,
    }

    fn registers(unit_id: u8, high: u16, low: u16) -> Vec<u8> {
        let [h0, h1] = high.to_be_bytes();
        let [l0, l1] = low.to_be_bytes();
        rtu_adu(unit_id, &[0x03, 4, h0, h1, l0, l1])
    }

    /// Connect an `RtuLink` to a drive that answers each request from `replies`.
    fn link_to_drive(replies: Vec<Reply>) -> RtuLink {
        let (client, mut drive) = tokio::io::duplex(256);

        tokio::spawn(async move {
            for reply in replies {
                let mut request = [0u8; 8];
                if drive.read_exact(&mut request).await.is_err() {
                    return;
                }
                match reply {
                    Reply::Frame(bytes) => drive.write_all(&bytes).await.unwrap(),
                    Reply::Late(delay, bytes) => {
                        tokio::time::sleep(delay).await;
                        drive.write_all(&bytes).await.unwrap();
                    }
                    Reply::Silent => {}
                }
            }
            hold_open(drive).await;
        });

        RtuLink::attach(client, "duplex", TIMEOUT)
    }

    async fn hold_open(_drive: DuplexStream) {
        std::future::pending::<()>().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_registers() {
        let mut link = link_to_drive(vec![Reply::Frame(registers(1, 1, 0x2E00))]);

        let regs = link
            .read_holding_registers(DriveRegister::OutputFrequency.request())
            .await
            .unwrap();
        assert_eq!(regs, vec![1, 0x2E00]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exception_response() {
        let mut link = link_to_drive(vec![Reply::Frame(rtu_adu(1, &[0x83, 0x02]))]);

        let err = link
            .read_holding_registers(DriveRegister::OutputFrequency.request())
            .await
            .unwrap_err();
        assert!(
            matches!(&err, PollerError::Exception(code) if code == "IllegalDataAddress"),
            "{err:?}"
        );
        assert!(err.is_recoverable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_from_other_unit_is_protocol_error() {
        let mut link = link_to_drive(vec![Reply::Frame(registers(2, 0, 5000))]);

        let err = link
            .read_holding_registers(DriveRegister::OutputFrequency.request())
            .await
            .unwrap_err();
        assert!(matches!(err, PollerError::Protocol(_)), "{err:?}");
        assert!(err.is_recoverable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_crc_times_out() {
        let mut frame = registers(1, 0, 5000);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        let mut link = link_to_drive(vec![Reply::Frame(frame)]);

        let err = link
            .read_holding_registers(DriveRegister::OutputCurrent.request())
            .await
            .unwrap_err();
        assert!(matches!(&err, PollerError::Timeout(t) if *t == TIMEOUT), "{err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_drive_times_out() {
        let mut link = link_to_drive(vec![Reply::Silent]);

        let err = link
            .read_holding_registers(DriveRegister::OutputVoltage.request())
            .await
            .unwrap_err();
        assert!(matches!(&err, PollerError::Timeout(t) if *t == TIMEOUT), "{err:?}");
        assert!(err.is_recoverable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_is_not_taken_for_next_request() {
        let mut link = link_to_drive(vec![
            Reply::Late(Duration::from_millis(250), registers(1, 0, 2400)),
            Reply::Frame(registers(1, 0, 5000)),
        ]);

        let err = link
            .read_holding_registers(DriveRegister::OutputVoltage.request())
            .await
            .unwrap_err();
        assert!(matches!(err, PollerError::Timeout(_)), "{err:?}");

        // Let the stale voltage reply land in the input buffer.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let regs = link
            .read_holding_registers(DriveRegister::OutputFrequency.request())
            .await
            .unwrap();
        assert_eq!(regs, vec![0, 5000]);
    }

    #[tokio::test]
    async fn test_closed_transport_is_fatal() {
        let (client, drive) = tokio::io::duplex(256);
        drop(drive);
        let mut link = RtuLink::attach(client, "duplex", TIMEOUT);

        let err = link
            .read_holding_registers(DriveRegister::OutputFrequency.request())
            .await
            .unwrap_err();
        assert!(matches!(err, PollerError::Transport(_)), "{err:?}");
        assert!(!err.is_recoverable());
    }
}
