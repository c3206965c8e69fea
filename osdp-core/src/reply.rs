//! OSDP reply code definitions
//!
//! Replies flow from the peripheral back to the control panel, in a code
//! range disjoint from the commands.

use std::fmt;

use crate::error::{Error, Result};

/// Reply codes sent by the peripheral
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reply {
    /// Positive acknowledge
    Ack = 0x40,
    /// Negative acknowledge, payload carries the error code
    Nak = 0x41,
    /// Peripheral identification report
    PdId = 0x45,
    /// Peripheral capabilities report
    PdCap = 0x46,
    /// Local status report
    LStatR = 0x48,
    /// Input status report
    IStatR = 0x49,
    /// Output status report
    OStatR = 0x4A,
    /// Reader status report
    RStatR = 0x4B,
    /// Raw card data
    Raw = 0x50,
    /// Formatted card data
    Fmt = 0x51,
    /// Keypad data
    Keypad = 0x53,
    /// Communication settings report
    Com = 0x54,
    /// Biometric read result
    BioReadR = 0x57,
    /// Biometric match result
    BioMatchR = 0x58,
    /// Peripheral cryptogram (secure channel handshake)
    CCrypt = 0x76,
    /// Peripheral busy, command not processed
    Busy = 0x79,
    /// Manufacturer-specific reply
    MfgRep = 0x90,
    /// Extended read response
    Xrd = 0xB1,
}

impl Reply {
    /// Get reply name
    pub fn name(self) -> &'static str {
        match self {
            Self::Ack => "REPLY_ACK",
            Self::Nak => "REPLY_NAK",
            Self::PdId => "REPLY_PDID",
            Self::PdCap => "REPLY_PDCAP",
            Self::LStatR => "REPLY_LSTATR",
            Self::IStatR => "REPLY_ISTATR",
            Self::OStatR => "REPLY_OSTATR",
            Self::RStatR => "REPLY_RSTATR",
            Self::Raw => "REPLY_RAW",
            Self::Fmt => "REPLY_FMT",
            Self::Keypad => "REPLY_KEYPAD",
            Self::Com => "REPLY_COM",
            Self::BioReadR => "REPLY_BIOREADR",
            Self::BioMatchR => "REPLY_BIOMATCHR",
            Self::CCrypt => "REPLY_CCRYPT",
            Self::Busy => "REPLY_BUSY",
            Self::MfgRep => "REPLY_MFGREP",
            Self::Xrd => "REPLY_XRD",
        }
    }

    /// Check if this is a success reply
    pub fn is_ack(self) -> bool {
        matches!(self, Self::Ack)
    }

    /// Check if this is an error reply
    pub fn is_nak(self) -> bool {
        matches!(self, Self::Nak)
    }
}

impl From<Reply> for u8 {
    fn from(reply: Reply) -> u8 {
        reply as u8
    }
}

impl TryFrom<u8> for Reply {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x40 => Ok(Self::Ack),
            0x41 => Ok(Self::Nak),
            0x45 => Ok(Self::PdId),
            0x46 => Ok(Self::PdCap),
            0x48 => Ok(Self::LStatR),
            0x49 => Ok(Self::IStatR),
            0x4A => Ok(Self::OStatR),
            0x4B => Ok(Self::RStatR),
            0x50 => Ok(Self::Raw),
            0x51 => Ok(Self::Fmt),
            0x53 => Ok(Self::Keypad),
            0x54 => Ok(Self::Com),
            0x57 => Ok(Self::BioReadR),
            0x58 => Ok(Self::BioMatchR),
            0x76 => Ok(Self::CCrypt),
            0x79 => Ok(Self::Busy),
            0x90 => Ok(Self::MfgRep),
            0xB1 => Ok(Self::Xrd),
            _ => Err(Error::UnknownReply(value)),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}
