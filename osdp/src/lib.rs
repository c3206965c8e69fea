//! # osdp
//!
//! Rust implementation of OSDP (Open Supervised Device Protocol), the
//! master/peripheral serial protocol access-control panels use to talk to
//! card readers and I/O modules.
//!
//! ## Features
//!
//! - Wire-exact packet codec with partial-frame reassembly and CRC-16
//! - AES-128 secure channel: session keys, cryptograms, chained MACs,
//!   payload encryption
//! - Messenger driving one bounded request/response cycle per peripheral
//! - Narrow async transceiver contract with a TCP implementation for
//!   RS-485 serial device servers
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use osdp::{Command, Message, Messenger};
//! use osdp_transport::TcpTransceiver;
//!
//! #[tokio::main]
//! async fn main() -> osdp::Result<()> {
//!     let mut transceiver = TcpTransceiver::new("192.168.1.10", 4000);
//!     transceiver.connect().await.map_err(osdp::Error::Transmit)?;
//!
//!     let mut messenger = Messenger::new(transceiver);
//!
//!     let poll = Message::new(Command::Poll, 0x00, 0, vec![])?;
//!     let reply = messenger
//!         .send_and_receive(&poll, Duration::from_millis(200))
//!         .await?;
//!     println!("reply: 0x{:02X}", reply.code);
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod messenger;

// Re-exports
pub use error::{Error, Result};
pub use messenger::Messenger;

// Re-export protocol types
pub use osdp_core::{
    Command, Message, Packet, Reply, SecureChannelSession, SecureChannelState, SecurityBlock,
    SessionKeys,
};
pub use osdp_transport::{TcpTransceiver, Transceiver};
