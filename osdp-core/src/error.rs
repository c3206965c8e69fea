//! Error types for osdp-core

/// Result type alias for osdp operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
///
/// Decode outcomes fall into two classes the caller must keep apart:
/// [`Error::PacketIncomplete`] means the frame is still arriving and the
/// caller should keep accumulating bytes; every other decode error is fatal
/// for the buffer at hand and must not be retried on the same bytes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fewer bytes available than the frame needs; retry after reading more
    #[error("Packet incomplete: {available} bytes available")]
    PacketIncomplete {
        available: usize,
    },

    /// Buffer holds a full-size region with no start-of-message marker
    #[error("Invalid start of message: 0x{found:02X}")]
    InvalidStartOfMessage {
        found: u8,
    },

    /// Masked peripheral address outside the 7-bit range
    #[error("Peripheral address out of range: 0x{address:02X}")]
    AddressOutOfRange {
        address: u8,
    },

    /// Declared frame or security-block length cannot describe a valid frame
    #[error("Invalid declared length: {declared}")]
    InvalidLength {
        declared: u16,
    },

    /// CRC-16 recomputation does not match the trailing checksum bytes
    #[error("Checksum failed: expected 0x{expected:04X}, received 0x{received:04X}")]
    ChecksumFailed {
        expected: u16,
        received: u16,
    },

    /// Sequence numbers are two bits wide
    #[error("Invalid sequence number: {sequence}")]
    InvalidSequenceNumber {
        sequence: u8,
    },

    /// Security block type outside the recognized SCS range
    #[error("Invalid secure block type: 0x{block_type:02X}")]
    InvalidSecureBlockType {
        block_type: u8,
    },

    /// Security block data exceeds the one-byte length field's capacity
    #[error("Secure block data too large: {len} bytes (max {max})")]
    SecureBlockTooLarge {
        len: usize,
        max: usize,
    },

    /// Unknown command code
    #[error("Unknown command code: 0x{0:02X}")]
    UnknownCommand(u8),

    /// Unknown reply code
    #[error("Unknown reply code: 0x{0:02X}")]
    UnknownReply(u8),

    /// Key material is not the required length
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        expected: usize,
        actual: usize,
    },

    /// Challenge material is not the required length
    #[error("Invalid challenge length: expected {expected} bytes, got {actual}")]
    InvalidChallengeLength {
        expected: usize,
        actual: usize,
    },

    /// Chaining IV is not one AES block
    #[error("Invalid IV length: expected {expected} bytes, got {actual}")]
    InvalidIvLength {
        expected: usize,
        actual: usize,
    },

    /// Ciphertext to decrypt is not a whole number of AES blocks
    #[error("Unpadded ciphertext: {len} bytes is not a multiple of 16")]
    UnpaddedCiphertext {
        len: usize,
    },

    /// Decrypted payload has no 0x80 padding marker to strip back to
    #[error("Invalid payload padding")]
    InvalidPadding,

    /// Secure-channel operation invoked on a clear message
    #[error("Message is not secure")]
    NotSecureMessage,

    /// Peripheral cryptogram does not authenticate the challenge exchange
    #[error("Cryptogram mismatch")]
    CryptogramMismatch,

    /// Received MAC does not match the chained recomputation
    #[error("MAC mismatch")]
    MacMismatch,

    /// Invalid secure-channel session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),
}

impl Error {
    /// Check whether this is the retryable accumulate-more-bytes outcome.
    ///
    /// The messenger keeps waiting on an incomplete frame but must stop
    /// immediately on any other decode error.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::PacketIncomplete { .. })
    }
}
