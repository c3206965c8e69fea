//! Logical view of one OSDP command or reply
//!
//! A [`Message`] is the transport-independent form of one exchange: code,
//! address, sequence number, security attributes and opaque payload. It is
//! lowered to a [`Packet`] for the wire and built back from one on receive;
//! the two are 1:1 and ephemeral, one per exchange.

use bytes::Bytes;

use crate::{
    constants::{scs, MAC_SIZE, MAX_SEQUENCE_NUMBER, MAX_SECURE_BLOCK_DATA},
    error::{Error, Result},
    packet::Packet,
};

/// One OSDP command or reply, as the application sees it
///
/// Immutable once built, except for the secure channel mutating `payload`
/// (encrypt/decrypt in place) and `mac` (set by MAC generation). The retry
/// counter is informational and owned by the caller's resend policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Command or reply code
    pub code: u8,

    /// Raw peripheral address byte
    pub peripheral_address: u8,

    /// Sequence number (0-3)
    pub sequence_number: u8,

    /// Opaque payload bytes
    pub payload: Bytes,

    /// Whether this message travels on the secure channel
    pub secure: bool,

    /// SCS block type (meaningful only when `secure`)
    pub secure_block_type: u8,

    /// Security block data (meaningful only when `secure`)
    pub secure_block_data: Bytes,

    /// Wire MAC, set by MAC generation or taken from a received frame
    pub mac: Option<[u8; MAC_SIZE]>,

    /// Transport-level retry counter, owned by the caller
    pub retries: u32,
}

impl Message {
    /// Create a clear (non-secure) message
    pub fn new(
        code: impl Into<u8>,
        peripheral_address: u8,
        sequence_number: u8,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        if sequence_number > MAX_SEQUENCE_NUMBER {
            return Err(Error::InvalidSequenceNumber {
                sequence: sequence_number,
            });
        }

        Ok(Self {
            code: code.into(),
            peripheral_address,
            sequence_number,
            payload: payload.into(),
            secure: false,
            secure_block_type: 0,
            secure_block_data: Bytes::new(),
            mac: None,
            retries: 0,
        })
    }

    /// Create a secure-channel message
    pub fn new_secure(
        code: impl Into<u8>,
        peripheral_address: u8,
        sequence_number: u8,
        secure_block_type: u8,
        secure_block_data: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        if sequence_number > MAX_SEQUENCE_NUMBER {
            return Err(Error::InvalidSequenceNumber {
                sequence: sequence_number,
            });
        }

        if !scs::is_valid(secure_block_type) {
            return Err(Error::InvalidSecureBlockType {
                block_type: secure_block_type,
            });
        }

        let secure_block_data = secure_block_data.into();
        if secure_block_data.len() > MAX_SECURE_BLOCK_DATA {
            return Err(Error::SecureBlockTooLarge {
                len: secure_block_data.len(),
                max: MAX_SECURE_BLOCK_DATA,
            });
        }

        Ok(Self {
            code: code.into(),
            peripheral_address,
            sequence_number,
            payload: payload.into(),
            secure: true,
            secure_block_type,
            secure_block_data,
            mac: None,
            retries: 0,
        })
    }

    /// Build the logical message out of a decoded packet, propagating
    /// sequence number, secure attributes and MAC.
    pub fn from_packet(packet: &Packet) -> Self {
        let (secure, secure_block_type, secure_block_data) = match &packet.security_block {
            Some(block) => (true, block.block_type, block.data.clone()),
            None => (false, 0, Bytes::new()),
        };

        Self {
            code: packet.code,
            peripheral_address: packet.peripheral_address,
            sequence_number: packet.sequence_number,
            payload: packet.payload.clone(),
            secure,
            secure_block_type,
            secure_block_data,
            mac: packet.mac,
            retries: 0,
        }
    }

    /// Lower the message to its wire-exact packet
    ///
    /// Embeds the MAC when one is set; the packet recomputes length and CRC
    /// on encode, so the MAC lands inside the CRC-covered region.
    pub fn to_packet(&self) -> Result<Packet> {
        if !self.secure {
            return Packet::new(
                self.code,
                self.peripheral_address,
                self.payload.clone(),
                self.sequence_number,
            );
        }

        let mut packet = Packet::new_secure(
            self.code,
            self.peripheral_address,
            self.payload.clone(),
            self.secure_block_type,
            self.secure_block_data.clone(),
            self.sequence_number,
        )?;
        packet.mac = self.mac;

        Ok(packet)
    }

    /// Whether this message's block type puts a MAC field on the wire
    pub fn carries_mac(&self) -> bool {
        self.secure && scs::carries_mac(self.secure_block_type)
    }
}
