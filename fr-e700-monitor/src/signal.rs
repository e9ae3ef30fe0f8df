//! Ctrl-C listener that is armed as soon as it is created.
//!
//! `tokio::signal::ctrl_c()` only registers its handler when first polled,
//! which leaves the default (terminate) disposition in place until the poll
//! loop reaches its first sleep.

use std::io;
use tracing::debug;

/// Armed Ctrl-C listener.
#[derive(Debug)]
pub struct Interrupt {
    #[cfg(unix)]
    inner: tokio::signal::unix::Signal,
    #[cfg(windows)]
    inner: tokio::signal::windows::CtrlC,
}

impl Interrupt {
    /// Register the handler now. Must be called from within a runtime.
    pub fn install() -> io::Result<Self> {
        #[cfg(unix)]
        let inner = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
        #[cfg(windows)]
        let inner = tokio::signal::windows::ctrl_c()?;

        debug!("Ctrl-C handler installed");
        Ok(Self { inner })
    }

    /// Resolve on the next Ctrl-C, including one received before this call.
    pub async fn recv(mut self) {
        if self.inner.recv().await.is_none() {
            // The signal driver is gone; never report an interrupt.
            std::future::pending::<()>().await;
        }
    }
}
