//! # osdp-core
//!
//! Core protocol implementation for OSDP (Open Supervised Device Protocol),
//! the master/peripheral serial protocol used by access-control panels to
//! talk to card readers and I/O modules.
//!
//! This crate provides the low-level protocol primitives:
//! - Packet structure and encoding/decoding
//! - CRC-16 checksum calculation
//! - Command and reply code definitions
//! - Secure channel key derivation, MAC and payload encryption
//! - Secure channel session state

pub mod checksum;
pub mod command;
pub mod constants;
pub mod error;
pub mod message;
pub mod packet;
pub mod reply;
pub mod secure;
pub mod session;

pub use command::Command;
pub use error::{Error, Result};
pub use message::Message;
pub use packet::{Packet, SecurityBlock};
pub use reply::Reply;
pub use secure::SessionKeys;
pub use session::{SecureChannelSession, SecureChannelState};

/// Protocol version information
pub const PROTOCOL_VERSION: &str = "2.2";

/// Start-of-message marker opening every frame
pub const SOM: u8 = 0x53;

/// Minimum size of an unsecured frame
pub const MIN_FRAME_SIZE: usize = 8;

/// AES block size used throughout the secure channel
pub const BLOCK_SIZE: usize = 16;
