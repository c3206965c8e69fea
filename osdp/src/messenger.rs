//! OSDP messenger
//!
//! Drives one request/response cycle against a [`Transceiver`]: transmit
//! the encoded frame, then accumulate inbound bytes until a complete valid
//! frame parses or the deadline elapses. Serial links deliver frames in
//! arbitrarily small chunks, so the accumulator is never cleared mid-cycle;
//! that is what lets a frame spread over many reads reassemble correctly.
//!
//! One messenger owns one transceiver, and OSDP allows one in-flight
//! transaction per peripheral, so a cycle runs as a single flow of control
//! with a cooperative deadline check, so there is no background read to
//! cancel or leak on timeout.

use std::time::Duration;

use bytes::BytesMut;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use osdp_core::{Message, Packet};
use osdp_transport::Transceiver;

use crate::error::{Error, Result};

/// Messenger driving one peripheral's request/response cycles
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use osdp::{Messenger, Command, Message};
/// use osdp_transport::TcpTransceiver;
///
/// #[tokio::main]
/// async fn main() -> osdp::Result<()> {
///     let mut transceiver = TcpTransceiver::new("192.168.1.10", 4000);
///     transceiver.connect().await.map_err(osdp::Error::Transmit)?;
///
///     let mut messenger = Messenger::new(transceiver);
///     let poll = Message::new(Command::Poll, 0x00, 0, vec![])?;
///     let reply = messenger
///         .send_and_receive(&poll, Duration::from_millis(200))
///         .await?;
///     println!("reply code 0x{:02X}", reply.code);
///     Ok(())
/// }
/// ```
pub struct Messenger {
    transceiver: Box<dyn Transceiver>,
}

impl Messenger {
    /// Create a messenger owning the given transceiver
    pub fn new(transceiver: impl Transceiver + 'static) -> Self {
        Self {
            transceiver: Box::new(transceiver),
        }
    }

    /// Encode and transmit one message
    ///
    /// A transmit failure is fatal for the cycle and reported immediately;
    /// the messenger never retries on its own.
    pub async fn send_message(&mut self, message: &Message) -> Result<()> {
        let packet = message.to_packet()?;
        let frame = packet.encode();

        trace!("Sending {:?}", packet);

        self.transceiver
            .transmit(&frame)
            .await
            .map_err(Error::Transmit)
    }

    /// Accumulate inbound bytes until a complete valid frame parses or the
    /// deadline elapses
    ///
    /// An incomplete frame keeps the loop waiting; any other decode error
    /// fails the cycle at once. On timeout the transceiver is reset (to
    /// flush a possibly desynchronized link) before the timeout is
    /// reported; a reset failure is surfaced as its own error. The call
    /// returns within the deadline plus at most one transport call: a read
    /// already in flight when the deadline passes still gets its result
    /// decoded.
    pub async fn receive_response(&mut self, timeout: Duration) -> Result<Message> {
        let deadline = Instant::now() + timeout;
        let mut accumulator = BytesMut::new();

        loop {
            if Instant::now() >= deadline {
                warn!("Receive timed out after {:?}, resetting transceiver", timeout);
                self.transceiver.reset().await.map_err(Error::Reset)?;
                return Err(Error::ReceiveTimeout { timeout });
            }

            let chunk = self.transceiver.receive().await.map_err(Error::Receive)?;
            accumulator.extend_from_slice(&chunk);

            match Packet::decode(&accumulator) {
                Ok((packet, consumed)) => {
                    trace!("Received {:?} ({} bytes)", packet, consumed);
                    return Ok(Message::from_packet(&packet));
                }
                Err(e) if e.is_incomplete() => {
                    trace!("Frame incomplete at {} bytes, waiting", accumulator.len());
                }
                Err(e) => {
                    debug!("Discarding cycle on decode error: {}", e);
                    return Err(Error::Protocol(e));
                }
            }
        }
    }

    /// Run one full send-then-receive cycle
    pub async fn send_and_receive(
        &mut self,
        message: &Message,
        timeout: Duration,
    ) -> Result<Message> {
        self.send_message(message).await?;
        self.receive_response(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use osdp_core::{Command, Reply};
    use osdp_transport::Error as TransportError;

    const ACK_FRAME: [u8; 8] = [0x53, 0x00, 0x08, 0x00, 0x04, 0x40, 0x89, 0x8E];

    /// Serves queued chunks one `receive` call at a time, recording what was
    /// transmitted.
    struct ScriptedTransceiver {
        chunks: VecDeque<Vec<u8>>,
        transmitted: Arc<std::sync::Mutex<Vec<Vec<u8>>>>,
        resets: Arc<AtomicUsize>,
    }

    impl ScriptedTransceiver {
        fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
            Self {
                chunks: chunks.into_iter().collect(),
                transmitted: Arc::new(std::sync::Mutex::new(Vec::new())),
                resets: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn byte_at_a_time(frame: &[u8]) -> Self {
            Self::new(frame.iter().map(|&b| vec![b]))
        }
    }

    #[async_trait]
    impl Transceiver for ScriptedTransceiver {
        async fn transmit(&mut self, frame: &[u8]) -> osdp_transport::Result<()> {
            self.transmitted.lock().unwrap().push(frame.to_vec());
            Ok(())
        }

        async fn receive(&mut self) -> osdp_transport::Result<BytesMut> {
            // Keep virtual time moving so an exhausted script still times out.
            tokio::time::sleep(Duration::from_millis(10)).await;
            let chunk = self.chunks.pop_front().unwrap_or_default();
            Ok(BytesMut::from(chunk.as_slice()))
        }

        async fn reset(&mut self) -> osdp_transport::Result<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Never produces a byte; counts resets.
    struct SilentTransceiver {
        resets: Arc<AtomicUsize>,
        fail_reset: bool,
    }

    #[async_trait]
    impl Transceiver for SilentTransceiver {
        async fn transmit(&mut self, _frame: &[u8]) -> osdp_transport::Result<()> {
            Ok(())
        }

        async fn receive(&mut self) -> osdp_transport::Result<BytesMut> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(BytesMut::new())
        }

        async fn reset(&mut self) -> osdp_transport::Result<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            if self.fail_reset {
                return Err(TransportError::Io(io::Error::other("reset failed")));
            }
            Ok(())
        }
    }

    /// Delivers the whole frame in one chunk, but only after a delay.
    struct SlowTransceiver {
        delay: Duration,
        frame: Vec<u8>,
    }

    #[async_trait]
    impl Transceiver for SlowTransceiver {
        async fn transmit(&mut self, _frame: &[u8]) -> osdp_transport::Result<()> {
            Ok(())
        }

        async fn receive(&mut self) -> osdp_transport::Result<BytesMut> {
            tokio::time::sleep(self.delay).await;
            Ok(BytesMut::from(self.frame.as_slice()))
        }

        async fn reset(&mut self) -> osdp_transport::Result<()> {
            Ok(())
        }
    }

    struct FailingTransceiver;

    #[async_trait]
    impl Transceiver for FailingTransceiver {
        async fn transmit(&mut self, _frame: &[u8]) -> osdp_transport::Result<()> {
            Err(TransportError::NotConnected)
        }

        async fn receive(&mut self) -> osdp_transport::Result<BytesMut> {
            Err(TransportError::ConnectionClosed)
        }

        async fn reset(&mut self) -> osdp_transport::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_reassembles_byte_at_a_time() {
        let mut messenger = Messenger::new(ScriptedTransceiver::byte_at_a_time(&ACK_FRAME));

        let message = messenger
            .receive_response(Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(message.code, u8::from(Reply::Ack));
        assert_eq!(message.peripheral_address, 0x00);
        assert_eq!(message.payload.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_skips_bus_noise() {
        let mut chunks = vec![vec![0xFF, 0x00, 0x17]];
        chunks.extend(ACK_FRAME.iter().map(|&b| vec![b]));
        let mut messenger = Messenger::new(ScriptedTransceiver::new(chunks));

        let message = messenger
            .receive_response(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(message.code, 0x40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_timeout_resets_exactly_once() {
        let resets = Arc::new(AtomicUsize::new(0));
        let mut messenger = Messenger::new(SilentTransceiver {
            resets: resets.clone(),
            fail_reset: false,
        });

        let timeout = Duration::from_millis(200);
        let started = Instant::now();
        let result = messenger.receive_response(timeout).await;

        assert!(matches!(result, Err(Error::ReceiveTimeout { .. })));
        assert!(started.elapsed() >= timeout, "timed out before the deadline");
        assert_eq!(resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_failure_is_surfaced() {
        let mut messenger = Messenger::new(SilentTransceiver {
            resets: Arc::new(AtomicUsize::new(0)),
            fail_reset: true,
        });

        let result = messenger.receive_response(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::Reset(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_completing_in_flight_read_is_accepted() {
        // The read straddling the deadline still gets decoded: the cycle is
        // bounded by deadline plus one transport call.
        let mut messenger = Messenger::new(SlowTransceiver {
            delay: Duration::from_millis(300),
            frame: ACK_FRAME.to_vec(),
        });

        let message = messenger
            .receive_response(Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(message.code, 0x40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_fails_without_waiting() {
        let mut corrupted = ACK_FRAME;
        corrupted[5] ^= 0x01;
        let mut messenger = Messenger::new(ScriptedTransceiver::new([corrupted.to_vec()]));

        let started = Instant::now();
        let result = messenger.receive_response(Duration::from_secs(10)).await;

        assert!(matches!(
            result,
            Err(Error::Protocol(osdp_core::Error::ChecksumFailed { .. }))
        ));
        // Fatal decode errors do not wait out the deadline.
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transmit_failure_is_fatal() {
        let mut messenger = Messenger::new(FailingTransceiver);
        let poll = Message::new(Command::Poll, 0x00, 0, vec![]).unwrap();

        let result = messenger.send_message(&poll).await;
        assert!(matches!(result, Err(Error::Transmit(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_error_aborts_cycle() {
        let mut messenger = Messenger::new(FailingTransceiver);

        let result = messenger.receive_response(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::Receive(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_and_receive_cycle() {
        let transceiver = ScriptedTransceiver::new([ACK_FRAME.to_vec()]);
        let mut messenger = Messenger::new(transceiver);

        let poll = Message::new(Command::Poll, 0x65, 0, vec![]).unwrap();
        let reply = messenger
            .send_and_receive(&poll, Duration::from_millis(200))
            .await
            .unwrap();

        assert_eq!(reply.code, u8::from(Reply::Ack));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_transmits_encoded_frame() {
        let transceiver = ScriptedTransceiver::new([ACK_FRAME.to_vec()]);
        let transmitted = transceiver.transmitted.clone();
        let resets = transceiver.resets.clone();
        let mut messenger = Messenger::new(transceiver);

        let poll = Message::new(Command::Poll, 0x65, 0, vec![]).unwrap();
        messenger
            .send_and_receive(&poll, Duration::from_millis(200))
            .await
            .unwrap();

        let frames = transmitted.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0],
            vec![0x53, 0x65, 0x08, 0x00, 0x04, 0x60, 0x60, 0x90]
        );
        assert_eq!(resets.load(Ordering::SeqCst), 0);
    }
}
