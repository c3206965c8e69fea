//! Transport layer for the OSDP protocol
//!
//! OSDP runs over point-to-point RS-485 links; this crate models the link
//! through the narrow [`Transceiver`] contract the messenger consumes, plus
//! a TCP implementation for serial device servers that bridge RS-485 onto
//! the network.

pub mod error;
pub mod tcp;

pub use error::{Error, Result};
pub use tcp::TcpTransceiver;

use async_trait::async_trait;
use bytes::BytesMut;

/// Byte-level transceiver driving one OSDP link
///
/// The messenger owns a transceiver exclusively for the duration of one
/// send-then-receive cycle; implementations need not be re-entrant.
#[async_trait]
pub trait Transceiver: Send {
    /// Transmit one encoded frame
    async fn transmit(&mut self, frame: &[u8]) -> Result<()>;

    /// Receive whatever bytes are currently available
    ///
    /// May return a partial frame or nothing at all; serial links deliver
    /// frames in arbitrarily small chunks. Implementations must return
    /// within a bounded interval (an internal per-call read timeout); the
    /// messenger owns the overall deadline and keeps calling until it has a
    /// complete frame or runs out of time.
    async fn receive(&mut self) -> Result<BytesMut>;

    /// Resynchronize the link after a timeout
    ///
    /// Invoked by the messenger when a cycle expires with a possibly
    /// half-delivered frame in flight.
    async fn reset(&mut self) -> Result<()>;
}
