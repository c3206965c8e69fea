//! Secure channel session state
//!
//! A session owns the key material and chaining IV for one peripheral's
//! secure channel and tracks the handshake:
//! `Inactive -> ChallengeIssued -> Established`. Restarting the handshake
//! always rederives the session keys and resets the IV chain; nothing is
//! shared between sessions or processes; the caller owns the object and
//! passes it where it is needed.

use crate::{
    error::{Error, Result},
    message::Message,
    secure::{self, SessionKeys, CHALLENGE_SIZE, KEY_SIZE},
    BLOCK_SIZE,
};

/// Secure channel handshake state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureChannelState {
    /// No handshake in progress, no valid keys
    Inactive,

    /// Challenge sent, session keys derived, awaiting the peripheral's
    /// cryptogram
    ChallengeIssued,

    /// Cryptograms exchanged, MAC chain seeded; messages may be
    /// authenticated and encrypted
    Established,
}

/// Secure channel session for one peripheral
pub struct SecureChannelSession {
    scbk: [u8; KEY_SIZE],
    state: SecureChannelState,
    challenge_cp: [u8; CHALLENGE_SIZE],
    keys: Option<SessionKeys>,
    ivc: [u8; BLOCK_SIZE],
}

impl SecureChannelSession {
    /// Create an inactive session around a pre-shared SCBK
    pub fn new(scbk: &[u8]) -> Result<Self> {
        let scbk = scbk.try_into().map_err(|_| Error::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: scbk.len(),
        })?;

        Ok(Self {
            scbk,
            state: SecureChannelState::Inactive,
            challenge_cp: [0; CHALLENGE_SIZE],
            keys: None,
            ivc: [0; BLOCK_SIZE],
        })
    }

    /// Get current state
    pub fn state(&self) -> SecureChannelState {
        self.state
    }

    /// Check if the secure channel is established
    pub fn is_established(&self) -> bool {
        matches!(self.state, SecureChannelState::Established)
    }

    /// Current chaining IV (the last MAC block, once established)
    pub fn ivc(&self) -> &[u8; BLOCK_SIZE] {
        &self.ivc
    }

    /// Session keys, available once a handshake has begun
    pub fn keys(&self) -> Result<&SessionKeys> {
        self.keys.as_ref().ok_or_else(|| {
            Error::InvalidSessionState(format!("No session keys in state: {:?}", self.state))
        })
    }

    /// Start (or restart) the handshake with a fresh controller challenge
    ///
    /// Rederives all session keys from the SCBK and zeroes the IV chain;
    /// any previous session material is invalidated.
    pub fn begin_handshake(&mut self, challenge_cp: &[u8]) -> Result<()> {
        let keys = secure::derive_session_keys(&self.scbk, challenge_cp)?;

        self.challenge_cp.copy_from_slice(challenge_cp);
        self.keys = Some(keys);
        self.ivc = [0; BLOCK_SIZE];
        self.state = SecureChannelState::ChallengeIssued;

        Ok(())
    }

    /// Verify the peripheral's cryptogram from its CCRYPT reply
    ///
    /// Expected value is `AES-ECB(s_enc, challenge_cp || rnd_pd)`.
    pub fn verify_peripheral_cryptogram(&self, rnd_pd: &[u8], cryptogram: &[u8]) -> Result<()> {
        self.expect_state(SecureChannelState::ChallengeIssued, "verify cryptogram")?;

        let expected = secure::compute_cryptogram(&self.challenge_cp, rnd_pd, &self.keys()?.s_enc)?;
        if cryptogram != expected {
            return Err(Error::CryptogramMismatch);
        }

        Ok(())
    }

    /// Compute the controller cryptogram for the SCRYPT command
    ///
    /// `AES-ECB(s_enc, rnd_pd || challenge_cp)`, the mirrored counterpart
    /// of the peripheral's cryptogram.
    pub fn controller_cryptogram(&self, rnd_pd: &[u8]) -> Result<[u8; BLOCK_SIZE]> {
        self.expect_state(SecureChannelState::ChallengeIssued, "compute cryptogram")?;

        secure::compute_cryptogram(rnd_pd, &self.challenge_cp, &self.keys()?.s_enc)
    }

    /// Seed the MAC chain from the peripheral's initial reply MAC and enter
    /// the established state
    pub fn establish(&mut self, initial_mac: &[u8]) -> Result<()> {
        self.expect_state(SecureChannelState::ChallengeIssued, "establish")?;

        self.ivc = initial_mac.try_into().map_err(|_| Error::InvalidIvLength {
            expected: BLOCK_SIZE,
            actual: initial_mac.len(),
        })?;
        self.state = SecureChannelState::Established;

        Ok(())
    }

    /// Generate and embed the MAC for an outgoing secure message
    ///
    /// Advances the IV chain: the full MAC block becomes the IV of the next
    /// MAC operation.
    pub fn authenticate_message(&mut self, message: &mut Message) -> Result<[u8; 4]> {
        self.expect_state(SecureChannelState::Established, "authenticate")?;

        let keys = self.keys()?;
        let block = secure::generate_mac(message, &self.ivc, &keys.s_mac1, &keys.s_mac2)?;

        let mac: [u8; 4] = block[..4].try_into().expect("block prefix");
        message.mac = Some(mac);
        self.ivc = block;

        Ok(mac)
    }

    /// Verify the MAC of a received secure message
    ///
    /// Recomputes the chained MAC and compares it against the frame's; the
    /// IV chain advances only when the MAC matches, so a corrupt frame does
    /// not desynchronize the session.
    pub fn verify_message_mac(&mut self, message: &Message) -> Result<()> {
        self.expect_state(SecureChannelState::Established, "verify MAC")?;

        let keys = self.keys()?;
        let block = secure::generate_mac(message, &self.ivc, &keys.s_mac1, &keys.s_mac2)?;

        match message.mac {
            Some(mac) if mac == block[..4] => {
                self.ivc = block;
                Ok(())
            }
            _ => Err(Error::MacMismatch),
        }
    }

    /// Encrypt a message payload in place under S-ENC, advancing the IV
    pub fn encrypt_message(&mut self, message: &mut Message) -> Result<()> {
        self.expect_state(SecureChannelState::Established, "encrypt")?;

        self.ivc = secure::encrypt_payload(message, &self.keys()?.s_enc, &self.ivc)?;
        Ok(())
    }

    /// Decrypt a message payload in place under S-ENC, advancing the IV
    pub fn decrypt_message(&mut self, message: &mut Message) -> Result<()> {
        self.expect_state(SecureChannelState::Established, "decrypt")?;

        self.ivc = secure::decrypt_payload(message, &self.keys()?.s_enc, &self.ivc)?;
        Ok(())
    }

    /// Drop all session material and return to the inactive state
    pub fn invalidate(&mut self) {
        self.keys = None;
        self.challenge_cp = [0; CHALLENGE_SIZE];
        self.ivc = [0; BLOCK_SIZE];
        self.state = SecureChannelState::Inactive;
    }

    fn expect_state(&self, expected: SecureChannelState, operation: &str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidSessionState(format!(
                "Cannot {} from state: {:?}",
                operation, self.state
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SecureChannelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannelSession")
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constants::scs, Command};
    use pretty_assertions::assert_eq;

    const SCBK: [u8; 16] = [
        0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x3B, 0x3C, 0x3D, 0x3E,
        0x3F,
    ];
    const CHALLENGE_CP: [u8; 8] = [0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7];
    const RND_PD: [u8; 8] = [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7];
    const PD_CRYPTOGRAM: [u8; 16] = [
        0xFD, 0xE5, 0xD2, 0xF4, 0x28, 0xEC, 0x16, 0x31, 0x24, 0x71, 0xEA, 0x3C, 0x02, 0xBD, 0x77,
        0x96,
    ];

    fn session_at_challenge() -> SecureChannelSession {
        let mut session = SecureChannelSession::new(&SCBK).unwrap();
        session.begin_handshake(&CHALLENGE_CP).unwrap();
        session
    }

    fn established_session() -> SecureChannelSession {
        let mut session = session_at_challenge();
        session.establish(&[0u8; 16]).unwrap();
        session
    }

    #[test]
    fn test_session_new() {
        let session = SecureChannelSession::new(&SCBK).unwrap();
        assert_eq!(session.state(), SecureChannelState::Inactive);
        assert!(!session.is_established());
        assert!(session.keys().is_err());
    }

    #[test]
    fn test_session_scbk_validation() {
        assert!(matches!(
            SecureChannelSession::new(&SCBK[..12]),
            Err(Error::InvalidKeyLength { expected: 16, actual: 12 })
        ));
    }

    #[test]
    fn test_handshake_flow() {
        let mut session = session_at_challenge();
        assert_eq!(session.state(), SecureChannelState::ChallengeIssued);

        session
            .verify_peripheral_cryptogram(&RND_PD, &PD_CRYPTOGRAM)
            .unwrap();

        let scrypt = session.controller_cryptogram(&RND_PD).unwrap();
        assert_eq!(hex::encode(scrypt), "26d3356e07762d262801fc8e6665a891");

        session.establish(&[0x11u8; 16]).unwrap();
        assert!(session.is_established());
        assert_eq!(session.ivc(), &[0x11u8; 16]);
    }

    #[test]
    fn test_bad_cryptogram_rejected() {
        let session = session_at_challenge();

        let mut tampered = PD_CRYPTOGRAM;
        tampered[0] ^= 0x01;

        assert!(matches!(
            session.verify_peripheral_cryptogram(&RND_PD, &tampered),
            Err(Error::CryptogramMismatch)
        ));
    }

    #[test]
    fn test_state_transitions_enforced() {
        let mut session = SecureChannelSession::new(&SCBK).unwrap();

        assert!(matches!(
            session.controller_cryptogram(&RND_PD),
            Err(Error::InvalidSessionState(_))
        ));
        assert!(matches!(
            session.establish(&[0u8; 16]),
            Err(Error::InvalidSessionState(_))
        ));

        let mut message =
            Message::new_secure(Command::Poll, 0x00, 0, scs::SCS_15, vec![0x00], vec![]).unwrap();
        assert!(matches!(
            session.authenticate_message(&mut message),
            Err(Error::InvalidSessionState(_))
        ));
    }

    #[test]
    fn test_restart_invalidates_keys() {
        let mut session = established_session();
        assert!(session.is_established());

        // A new challenge tears the old session down.
        session.begin_handshake(&[0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7]).unwrap();
        assert_eq!(session.state(), SecureChannelState::ChallengeIssued);
        assert_eq!(session.ivc(), &[0u8; 16]);

        let mut message =
            Message::new_secure(Command::Poll, 0x00, 0, scs::SCS_15, vec![0x00], vec![]).unwrap();
        assert!(session.authenticate_message(&mut message).is_err());
    }

    #[test]
    fn test_mac_chain_advances() {
        let mut session = established_session();

        let mut first =
            Message::new_secure(Command::Poll, 0x00, 1, scs::SCS_15, vec![0x00], vec![]).unwrap();
        let mut second =
            Message::new_secure(Command::Poll, 0x00, 2, scs::SCS_15, vec![0x00], vec![]).unwrap();

        let mac1 = session.authenticate_message(&mut first).unwrap();
        let iv_after_first = *session.ivc();
        let mac2 = session.authenticate_message(&mut second).unwrap();

        assert_eq!(first.mac, Some(mac1));
        assert_eq!(&iv_after_first[..4], &mac1);
        // The chained IV makes the second MAC depend on the first.
        assert_ne!(mac1, mac2);
        assert_ne!(*session.ivc(), iv_after_first);
    }

    #[test]
    fn test_verify_message_mac() {
        let mut sender = established_session();
        let mut receiver = established_session();

        let mut message =
            Message::new_secure(Command::Poll, 0x00, 1, scs::SCS_15, vec![0x00], vec![]).unwrap();
        sender.authenticate_message(&mut message).unwrap();

        receiver.verify_message_mac(&message).unwrap();
        assert_eq!(receiver.ivc(), sender.ivc());
    }

    #[test]
    fn test_verify_message_mac_mismatch_keeps_chain() {
        let mut sender = established_session();
        let mut receiver = established_session();

        let mut message =
            Message::new_secure(Command::Poll, 0x00, 1, scs::SCS_15, vec![0x00], vec![]).unwrap();
        sender.authenticate_message(&mut message).unwrap();
        message.mac = Some([0x00, 0x11, 0x22, 0x33]);

        let iv_before = *receiver.ivc();
        assert!(matches!(
            receiver.verify_message_mac(&message),
            Err(Error::MacMismatch)
        ));
        assert_eq!(receiver.ivc(), &iv_before);
    }

    #[test]
    fn test_encrypt_decrypt_through_session() {
        let mut sender = established_session();
        let mut receiver = established_session();

        let mut message = Message::new_secure(
            Command::Data,
            0x00,
            1,
            scs::SCS_17,
            vec![0x00],
            &b"card data"[..],
        )
        .unwrap();

        sender.encrypt_message(&mut message).unwrap();
        assert_ne!(message.payload.as_ref(), b"card data");

        receiver.decrypt_message(&mut message).unwrap();
        assert_eq!(message.payload.as_ref(), b"card data");
        assert_eq!(sender.ivc(), receiver.ivc());
    }

    #[test]
    fn test_invalidate() {
        let mut session = established_session();
        session.invalidate();

        assert_eq!(session.state(), SecureChannelState::Inactive);
        assert!(session.keys().is_err());
    }
}
