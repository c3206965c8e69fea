//! OSDP packet structure and encoding/decoding
//!
//! # Frame Structure
//!
//! ```text
//! ┌──────┬──────┬─────────┬──────┬───────────────────────┬──────┬─────────┬────────┬─────────┐
//! │ SOM  │ ADDR │ LEN     │ CTRL │ [SB_LEN SB_TYPE DATA] │ CODE │ PAYLOAD │ [MAC]  │ CRC     │
//! │ 0x53 │ 1 B  │ 2 B LE  │ 1 B  │ secure frames only    │ 1 B  │ N B     │ 4 B    │ 2 B LE  │
//! └──────┴──────┴─────────┴──────┴───────────────────────┴──────┴─────────┴────────┴─────────┘
//! ```
//!
//! `LEN` is the total frame size including the CRC. The MAC field is present
//! only for security-block types above the handshake range. The CRC covers
//! every preceding byte of the frame.
//!
//! Decoding distinguishes an *incomplete* buffer (more bytes still arriving
//! on the serial link) from a *malformed* one; only the former is retryable.
//!
//! # Examples
//!
//! ```
//! use osdp_core::{Command, Packet};
//!
//! let packet = Packet::new(Command::Poll, 0x65, vec![], 0).unwrap();
//! let encoded = packet.encode();
//!
//! let (decoded, consumed) = Packet::decode(&encoded).unwrap();
//! assert_eq!(consumed, encoded.len());
//! assert_eq!(decoded, packet);
//! ```

use std::fmt;

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::{
    checksum,
    constants::{scs, ADDRESS_MASK, MAC_SIZE, MAX_ADDRESS, MAX_SECURE_BLOCK_DATA, MAX_SEQUENCE_NUMBER},
    error::{Error, Result},
    MIN_FRAME_SIZE, SOM,
};

bitflags! {
    /// Flag bits of the message control byte.
    ///
    /// The low two bits carry the sequence number and are not flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlFlags: u8 {
        /// Frame integrity uses CRC-16 (always set by this implementation)
        const CRC16 = 0b0000_0100;

        /// A security block follows the header
        const SECURE_BLOCK = 0b0000_1000;
    }
}

/// Optional security block of a secure-channel frame
#[derive(Clone, PartialEq, Eq)]
pub struct SecurityBlock {
    /// SCS block type identifying the secure-channel stage
    pub block_type: u8,

    /// Block data (key reference, etc.)
    pub data: Bytes,
}

impl SecurityBlock {
    /// Bytes this block occupies on the wire, including its length byte
    pub fn wire_len(&self) -> usize {
        2 + self.data.len()
    }

    /// Whether frames carrying this block type also carry a MAC field
    pub fn carries_mac(&self) -> bool {
        scs::carries_mac(self.block_type)
    }
}

impl fmt::Debug for SecurityBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityBlock")
            .field("block_type", &format!("0x{:02X}", self.block_type))
            .field("data", &hex::encode(&self.data))
            .finish()
    }
}

/// Wire-exact OSDP frame
///
/// The length and CRC fields are derived during [`Packet::encode`] and never
/// independently settable. The peripheral address is stored raw: replies
/// from the peripheral set the top bit, which is masked off for range
/// validation only.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Command or reply code (the two code spaces are disjoint)
    pub code: u8,

    /// Raw address byte; low 7 bits address the peripheral
    pub peripheral_address: u8,

    /// Sequence number (0-3)
    pub sequence_number: u8,

    /// Security block, present on secure-channel frames
    pub security_block: Option<SecurityBlock>,

    /// Opaque payload bytes
    pub payload: Bytes,

    /// Message authentication code, present when the block type requires it.
    /// `None` encodes as a zero placeholder until MAC generation fills it.
    pub mac: Option<[u8; MAC_SIZE]>,
}

impl Packet {
    /// Create a clear (non-secure) packet
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidSequenceNumber`] when `sequence > 3` and
    /// [`Error::AddressOutOfRange`] when the masked address is out of range.
    pub fn new(
        code: impl Into<u8>,
        peripheral_address: u8,
        payload: impl Into<Bytes>,
        sequence_number: u8,
    ) -> Result<Self> {
        validate_route(peripheral_address, sequence_number)?;

        Ok(Self {
            code: code.into(),
            peripheral_address,
            sequence_number,
            security_block: None,
            payload: payload.into(),
            mac: None,
        })
    }

    /// Create a secure-channel packet
    ///
    /// # Errors
    ///
    /// In addition to the clear-packet validation, fails with
    /// [`Error::InvalidSecureBlockType`] for a type outside `SCS_11..=SCS_18`
    /// and [`Error::SecureBlockTooLarge`] when the block data exceeds 0xFE
    /// bytes.
    pub fn new_secure(
        code: impl Into<u8>,
        peripheral_address: u8,
        payload: impl Into<Bytes>,
        block_type: u8,
        block_data: impl Into<Bytes>,
        sequence_number: u8,
    ) -> Result<Self> {
        validate_route(peripheral_address, sequence_number)?;

        if !scs::is_valid(block_type) {
            return Err(Error::InvalidSecureBlockType { block_type });
        }

        let block_data = block_data.into();
        if block_data.len() > MAX_SECURE_BLOCK_DATA {
            return Err(Error::SecureBlockTooLarge {
                len: block_data.len(),
                max: MAX_SECURE_BLOCK_DATA,
            });
        }

        Ok(Self {
            code: code.into(),
            peripheral_address,
            sequence_number,
            security_block: Some(SecurityBlock {
                block_type,
                data: block_data,
            }),
            payload: payload.into(),
            mac: None,
        })
    }

    /// Whether this frame carries a MAC field on the wire
    pub fn carries_mac(&self) -> bool {
        self.security_block
            .as_ref()
            .is_some_and(SecurityBlock::carries_mac)
    }

    /// Total frame size on the wire, including the trailing CRC
    pub fn wire_len(&self) -> usize {
        let security = self
            .security_block
            .as_ref()
            .map_or(0, SecurityBlock::wire_len);
        let mac = if self.carries_mac() { MAC_SIZE } else { 0 };

        MIN_FRAME_SIZE + security + mac + self.payload.len()
    }

    /// Assemble the control byte from sequence number and flags
    pub fn control_info(&self) -> u8 {
        let mut flags = ControlFlags::CRC16;
        if self.security_block.is_some() {
            flags |= ControlFlags::SECURE_BLOCK;
        }

        self.sequence_number | flags.bits()
    }

    /// Encode the packet to wire bytes
    ///
    /// The length field and CRC are computed here; a MAC-bearing frame
    /// without a MAC set gets a zero placeholder (filled in later by MAC
    /// generation, which then re-encodes).
    pub fn encode(&self) -> BytesMut {
        let total = self.wire_len();
        let mut buf = BytesMut::with_capacity(total);

        buf.put_u8(SOM);
        buf.put_u8(self.peripheral_address);
        buf.put_u16_le(total as u16);
        buf.put_u8(self.control_info());

        if let Some(block) = &self.security_block {
            buf.put_u8(block.wire_len() as u8);
            buf.put_u8(block.block_type);
            buf.put_slice(&block.data);
        }

        buf.put_u8(self.code);
        buf.put_slice(&self.payload);

        if self.carries_mac() {
            buf.put_slice(&self.mac.unwrap_or([0; MAC_SIZE]));
        }

        let crc = checksum::crc16(&buf);
        buf.put_u16_le(crc);

        trace!(frame = hex::encode(&buf), "Encoded packet");

        buf
    }

    /// Decode one packet from a byte buffer
    ///
    /// Leading bytes before the start marker are bus noise and are skipped,
    /// not treated as corruption. On success returns the packet and the
    /// number of bytes consumed (noise plus frame), so a caller streaming
    /// several frames out of one buffer can advance past exactly the
    /// consumed region.
    ///
    /// # Errors
    ///
    /// [`Error::PacketIncomplete`] means the frame has not fully arrived and
    /// the caller should keep accumulating. Every other error is fatal for
    /// this buffer: appending more bytes can never make it valid.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let noise = buf.iter().position(|&b| b == SOM).unwrap_or(0);
        let frame_buf = &buf[noise..];

        if frame_buf.len() < MIN_FRAME_SIZE {
            return Err(Error::PacketIncomplete {
                available: frame_buf.len(),
            });
        }

        if frame_buf[0] != SOM {
            return Err(Error::InvalidStartOfMessage { found: frame_buf[0] });
        }

        let peripheral_address = frame_buf[1];
        if (peripheral_address & ADDRESS_MASK) > MAX_ADDRESS {
            return Err(Error::AddressOutOfRange {
                address: peripheral_address,
            });
        }

        let declared = u16::from_le_bytes([frame_buf[2], frame_buf[3]]);
        if (declared as usize) < MIN_FRAME_SIZE {
            return Err(Error::InvalidLength { declared });
        }
        if frame_buf.len() < declared as usize {
            return Err(Error::PacketIncomplete {
                available: frame_buf.len(),
            });
        }

        let frame = &frame_buf[..declared as usize];
        let control = frame[4];
        let sequence_number = control & MAX_SEQUENCE_NUMBER;
        let flags = ControlFlags::from_bits_truncate(control);

        // Everything between the fixed header/code/CRC: security block,
        // payload and MAC share this region.
        let mut body_len = frame.len() - MIN_FRAME_SIZE;
        let mut index = 5;

        let security_block = if flags.contains(ControlFlags::SECURE_BLOCK) {
            let block_len = frame[index] as usize;
            if block_len < 2 || block_len > body_len {
                return Err(Error::InvalidLength { declared });
            }

            let block_type = frame[index + 1];
            if !scs::is_valid(block_type) {
                return Err(Error::InvalidSecureBlockType { block_type });
            }

            let data = Bytes::copy_from_slice(&frame[index + 2..index + block_len]);
            index += block_len;
            body_len -= block_len;

            Some(SecurityBlock { block_type, data })
        } else {
            None
        };

        let code = frame[index];
        index += 1;

        let mac_len = security_block
            .as_ref()
            .map_or(0, |block| if block.carries_mac() { MAC_SIZE } else { 0 });
        let payload_len = body_len
            .checked_sub(mac_len)
            .ok_or(Error::InvalidLength { declared })?;

        let payload = Bytes::copy_from_slice(&frame[index..index + payload_len]);
        index += payload_len;

        let mac = if mac_len > 0 {
            let mut mac = [0u8; MAC_SIZE];
            mac.copy_from_slice(&frame[index..index + MAC_SIZE]);
            index += MAC_SIZE;
            Some(mac)
        } else {
            None
        };

        let received = u16::from_le_bytes([frame[index], frame[index + 1]]);
        let expected = checksum::crc16(&frame[..frame.len() - 2]);
        if received != expected {
            return Err(Error::ChecksumFailed { expected, received });
        }

        let packet = Self {
            code,
            peripheral_address,
            sequence_number,
            security_block,
            payload,
            mac,
        };

        trace!(consumed = noise + frame.len(), "Decoded {:?}", packet);

        Ok((packet, noise + frame.len()))
    }
}

fn validate_route(peripheral_address: u8, sequence_number: u8) -> Result<()> {
    if (peripheral_address & ADDRESS_MASK) > MAX_ADDRESS {
        return Err(Error::AddressOutOfRange {
            address: peripheral_address,
        });
    }

    if sequence_number > MAX_SEQUENCE_NUMBER {
        return Err(Error::InvalidSequenceNumber {
            sequence: sequence_number,
        });
    }

    Ok(())
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("code", &format!("0x{:02X}", self.code))
            .field("address", &format!("0x{:02X}", self.peripheral_address))
            .field("sequence", &self.sequence_number)
            .field("secure", &self.security_block.is_some())
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet[0x{:02X}](addr=0x{:02X}, seq={}, len={})",
            self.code,
            self.peripheral_address,
            self.sequence_number,
            self.payload.len()
        )
    }
}
