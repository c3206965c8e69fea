//! Protocol constants

/// Mask isolating the 7-bit peripheral address. The top bit of the address
/// byte flags a reply coming from the peripheral and is excluded from range
/// validation.
pub const ADDRESS_MASK: u8 = 0x7F;

/// Highest valid peripheral address after masking
pub const MAX_ADDRESS: u8 = 0x7F;

/// Sequence numbers occupy the low two bits of the control byte
pub const MAX_SEQUENCE_NUMBER: u8 = 0x03;

/// Largest security-block data region a frame can carry
pub const MAX_SECURE_BLOCK_DATA: usize = 0xFE;

/// Bytes on the wire for a MAC-bearing frame's MAC field
pub const MAC_SIZE: usize = 4;

/// Default per-cycle timeout (milliseconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 200;

/// Secure channel block types (SCS)
///
/// The type byte of the security block identifies the stage of the secure
/// channel a frame belongs to.
pub mod scs {
    /// CHLNG: controller challenge, clear
    pub const SCS_11: u8 = 0x11;

    /// CCRYPT: peripheral cryptogram reply, clear
    pub const SCS_12: u8 = 0x12;

    /// SCRYPT: controller cryptogram, clear
    pub const SCS_13: u8 = 0x13;

    /// RMAC-I: initial reply MAC, clear
    pub const SCS_14: u8 = 0x14;

    /// MAC-protected, clear payload (command)
    pub const SCS_15: u8 = 0x15;

    /// MAC-protected, clear payload (reply)
    pub const SCS_16: u8 = 0x16;

    /// MAC-protected, encrypted payload (command)
    pub const SCS_17: u8 = 0x17;

    /// MAC-protected, encrypted payload (reply)
    pub const SCS_18: u8 = 0x18;

    /// Block types strictly above this carry a 4-byte MAC; the handshake
    /// types at or below it do not. Inferred from the SCS enumeration;
    /// kept as a named constant so it can be revisited against the formal
    /// OSDP profile.
    pub const MAC_THRESHOLD: u8 = SCS_14;

    /// Whether frames of this block type carry a MAC field
    pub fn carries_mac(block_type: u8) -> bool {
        block_type > MAC_THRESHOLD
    }

    /// Whether this is a recognized secure channel block type
    pub fn is_valid(block_type: u8) -> bool {
        (SCS_11..=SCS_18).contains(&block_type)
    }
}
