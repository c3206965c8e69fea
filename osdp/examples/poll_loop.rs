//! Periodic POLL loop against a peripheral behind an RS-485/TCP bridge

use std::time::Duration;

use osdp::{Command, Message, Messenger, Reply};
use osdp_transport::TcpTransceiver;

const PERIPHERAL_ADDRESS: u8 = 0x00;
const POLL_PERIOD: Duration = Duration::from_millis(200);
const CYCLE_TIMEOUT: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> osdp::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let host = std::env::var("OSDP_BRIDGE").unwrap_or_else(|_| "192.168.1.10".to_string());

    println!("Connecting to serial bridge at {}...", host);

    let mut transceiver = TcpTransceiver::new(host, 4000);
    transceiver.connect().await.map_err(osdp::Error::Transmit)?;

    let mut messenger = Messenger::new(transceiver);
    let mut sequence: u8 = 0;
    let mut ticker = tokio::time::interval(POLL_PERIOD);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                let poll = Message::new(Command::Poll, PERIPHERAL_ADDRESS, sequence, vec![])?;

                match messenger.send_and_receive(&poll, CYCLE_TIMEOUT).await {
                    Ok(reply) => {
                        sequence = (sequence + 1) & 0x03;
                        match Reply::try_from(reply.code) {
                            Ok(Reply::Ack) => println!("ACK from 0x{:02X}", reply.peripheral_address),
                            Ok(Reply::Nak) => println!("NAK: {:02X?}", reply.payload.as_ref()),
                            Ok(code) => println!("{} ({} payload bytes)", code, reply.payload.len()),
                            Err(_) => println!("Unknown reply 0x{:02X}", reply.code),
                        }
                    }
                    Err(e) if e.is_retryable() => {
                        eprintln!("cycle failed, will poll again: {e}");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }
}
