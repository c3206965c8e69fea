//! OSDP command code definitions
//!
//! Commands flow from the control panel to the peripheral. The codec treats
//! codes as opaque bytes; these definitions exist for applications building
//! and classifying messages.

use std::fmt;

use crate::error::{Error, Result};

/// Command codes sent by the control panel
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Periodic poll for status and queued events
    Poll = 0x60,
    /// Request peripheral identification
    Id = 0x61,
    /// Request peripheral capabilities
    Cap = 0x62,
    /// Diagnostics
    Diag = 0x63,
    /// Local status report request
    LStat = 0x64,
    /// Input status report request
    IStat = 0x65,
    /// Output status report request
    OStat = 0x66,
    /// Reader status report request
    RStat = 0x67,
    /// Output control
    Out = 0x68,
    /// Reader LED control
    Led = 0x69,
    /// Reader buzzer control
    Buz = 0x6A,
    /// Reader text output
    Text = 0x6B,
    /// Communication settings (address / baud)
    ComSet = 0x6E,
    /// Data transfer
    Data = 0x6F,
    /// Prompt selection
    Prompt = 0x71,
    /// Biometric read
    BioRead = 0x73,
    /// Biometric match
    BioMatch = 0x74,
    /// Secure channel key set
    KeySet = 0x75,
    /// Secure channel challenge
    Chlng = 0x76,
    /// Secure channel controller cryptogram
    SCrypt = 0x77,
    /// Abort current operation
    Abort = 0x7A,
    /// Maximum reply size negotiation
    MaxReply = 0x7B,
    /// Manufacturer-specific command
    Mfg = 0x80,
}

impl Command {
    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::Poll => "CMD_POLL",
            Self::Id => "CMD_ID",
            Self::Cap => "CMD_CAP",
            Self::Diag => "CMD_DIAG",
            Self::LStat => "CMD_LSTAT",
            Self::IStat => "CMD_ISTAT",
            Self::OStat => "CMD_OSTAT",
            Self::RStat => "CMD_RSTAT",
            Self::Out => "CMD_OUT",
            Self::Led => "CMD_LED",
            Self::Buz => "CMD_BUZ",
            Self::Text => "CMD_TEXT",
            Self::ComSet => "CMD_COMSET",
            Self::Data => "CMD_DATA",
            Self::Prompt => "CMD_PROMPT",
            Self::BioRead => "CMD_BIOREAD",
            Self::BioMatch => "CMD_BIOMATCH",
            Self::KeySet => "CMD_KEYSET",
            Self::Chlng => "CMD_CHLNG",
            Self::SCrypt => "CMD_SCRYPT",
            Self::Abort => "CMD_ABORT",
            Self::MaxReply => "CMD_MAXREPLY",
            Self::Mfg => "CMD_MFG",
        }
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x60 => Ok(Self::Poll),
            0x61 => Ok(Self::Id),
            0x62 => Ok(Self::Cap),
            0x63 => Ok(Self::Diag),
            0x64 => Ok(Self::LStat),
            0x65 => Ok(Self::IStat),
            0x66 => Ok(Self::OStat),
            0x67 => Ok(Self::RStat),
            0x68 => Ok(Self::Out),
            0x69 => Ok(Self::Led),
            0x6A => Ok(Self::Buz),
            0x6B => Ok(Self::Text),
            0x6E => Ok(Self::ComSet),
            0x6F => Ok(Self::Data),
            0x71 => Ok(Self::Prompt),
            0x73 => Ok(Self::BioRead),
            0x74 => Ok(Self::BioMatch),
            0x75 => Ok(Self::KeySet),
            0x76 => Ok(Self::Chlng),
            0x77 => Ok(Self::SCrypt),
            0x7A => Ok(Self::Abort),
            0x7B => Ok(Self::MaxReply),
            0x80 => Ok(Self::Mfg),
            _ => Err(Error::UnknownCommand(value)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}
