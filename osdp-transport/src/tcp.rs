//! TCP transceiver
//!
//! Many installations bridge the RS-485 bus through a serial device server
//! that exposes the raw byte stream on a TCP port; this transceiver speaks
//! to such a bridge. The stream carries OSDP frame bytes with no extra
//! framing.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::{error::*, Transceiver};

/// TCP transceiver for an RS-485 serial device server
pub struct TcpTransceiver {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl TcpTransceiver {
    /// Create a new TCP transceiver
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            stream: None,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_millis(50),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-call read timeout
    ///
    /// Bounds a single `receive` call; the messenger's cycle deadline sits
    /// above this. Keep it well below the cycle timeout so the deadline
    /// check stays responsive.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Connect to the serial device server
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;

        // Frames are small and latency-bound; don't let Nagle batch them
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        self.stream = Some(stream);
        Ok(())
    }

    /// Disconnect from the serial device server
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.remote_addr());
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    /// Get remote address
    pub fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }

    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(*addr);
        Ok(*addr)
    }
}

#[async_trait]
impl Transceiver for TcpTransceiver {
    async fn transmit(&mut self, frame: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        trace!("Transmitting {} bytes: {}", frame.len(), hex::encode(frame));

        stream.write_all(frame).await?;
        stream.flush().await?;

        Ok(())
    }

    async fn receive(&mut self) -> Result<BytesMut> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let mut buf = BytesMut::with_capacity(256);

        // An empty result after the read timeout is normal: the peripheral
        // may still be turning the line around. The messenger keeps calling.
        match timeout(self.read_timeout, stream.read_buf(&mut buf)).await {
            Err(_) => return Ok(buf),
            Ok(Err(e)) => return Err(Error::Io(e)),
            Ok(Ok(0)) => return Err(Error::ConnectionClosed),
            Ok(Ok(n)) => {
                trace!("Received {} bytes: {}", n, hex::encode(&buf[..n]));
            }
        }

        Ok(buf)
    }

    async fn reset(&mut self) -> Result<()> {
        warn!("Resetting transceiver to {}", self.remote_addr());

        // Tear the stream down and reconnect: any half-delivered frame
        // still queued on the bridge dies with the old connection.
        self.disconnect().await?;
        self.connect().await
    }
}

impl Drop for TcpTransceiver {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("TCP transceiver dropped while still connected");
        }
    }
}
