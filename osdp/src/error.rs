//! Cycle-level error types

use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of one send-then-receive cycle
///
/// Transport failures carry the phase they occurred in: a transmit failure
/// aborts the cycle before any bytes are awaited, a receive failure aborts
/// mid-accumulation, and a reset failure is surfaced on its own rather than
/// masked behind the timeout that triggered it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Codec or secure-channel error, mapped 1:1 from the core
    #[error("Protocol error: {0}")]
    Protocol(#[from] osdp_core::Error),

    /// Transmit leg failed; nothing was awaited
    #[error("Transmit failed: {0}")]
    Transmit(#[source] osdp_transport::Error),

    /// Receive leg failed while accumulating the response
    #[error("Receive failed: {0}")]
    Receive(#[source] osdp_transport::Error),

    /// Transceiver reset after a timeout failed
    #[error("Transceiver reset failed: {0}")]
    Reset(#[source] osdp_transport::Error),

    /// No complete valid frame arrived within the deadline
    #[error("Receive timeout after {timeout:?}")]
    ReceiveTimeout {
        timeout: Duration,
    },
}

impl Error {
    /// Check if the cycle may be retried by the caller's resend policy
    ///
    /// Timeouts and transport failures are worth a resend; protocol errors
    /// mean the peer sent something this stack rejects, and resending the
    /// same cycle will not change that.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ReceiveTimeout { .. } | Self::Transmit(_) | Self::Receive(_)
        )
    }
}
