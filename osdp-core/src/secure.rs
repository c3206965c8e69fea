//! OSDP secure channel primitives
//!
//! Session keys are derived from the pre-shared SCBK and the controller's
//! challenge; per-message integrity uses a two-key CBC-MAC over the frame
//! and payload confidentiality uses AES-128-CBC with the protocol's own
//! padding scheme (`0x80` marker, zero fill to the block boundary).
//!
//! The chaining IV is never mutated through shared state: every operation
//! takes the current IV and returns the next one, so the chain stays
//! visible at the call site. [`crate::SecureChannelSession`] threads it for
//! callers that want that done for them.

use std::fmt;

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use bytes::Bytes;

use crate::{
    constants::MAC_SIZE,
    error::{Error, Result},
    message::Message,
    BLOCK_SIZE,
};

/// Pre-shared and derived key size (AES-128)
pub const KEY_SIZE: usize = 16;

/// Challenge size exchanged during the handshake
pub const CHALLENGE_SIZE: usize = 8;

/// Padding marker appended before zero fill
const PAD_MARKER: u8 = 0x80;

/// Key-derivation purpose bytes, one pair per session key
const S_ENC_PURPOSE: [u8; 2] = [0x01, 0x82];
const S_MAC1_PURPOSE: [u8; 2] = [0x01, 0x01];
const S_MAC2_PURPOSE: [u8; 2] = [0x01, 0x02];

/// Session keys derived for one secure-channel session
///
/// Invalidated whenever the challenge/response handshake restarts.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKeys {
    /// Payload encryption key
    pub s_enc: [u8; KEY_SIZE],

    /// MAC key for all but the final block
    pub s_mac1: [u8; KEY_SIZE],

    /// MAC key for the final block
    pub s_mac2: [u8; KEY_SIZE],
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material stays out of logs
        f.write_str("SessionKeys(..)")
    }
}

/// Derive the session keys from the SCBK and the controller challenge
///
/// Each key is one AES-ECB encryption of a 16-byte template: the purpose
/// byte pair, the first six challenge bytes, zero padded.
///
/// # Errors
///
/// [`Error::InvalidKeyLength`] unless `scbk` is exactly 16 bytes,
/// [`Error::InvalidChallengeLength`] unless the challenge is exactly 8.
pub fn derive_session_keys(scbk: &[u8], challenge_cp: &[u8]) -> Result<SessionKeys> {
    let scbk = as_key(scbk)?;
    let challenge = as_challenge(challenge_cp)?;

    let derive = |purpose: [u8; 2]| {
        let mut block = [0u8; BLOCK_SIZE];
        block[..2].copy_from_slice(&purpose);
        block[2..8].copy_from_slice(&challenge[..6]);
        encrypt_block(&scbk, &mut block);
        block
    };

    Ok(SessionKeys {
        s_enc: derive(S_ENC_PURPOSE),
        s_mac1: derive(S_MAC1_PURPOSE),
        s_mac2: derive(S_MAC2_PURPOSE),
    })
}

/// Compute a handshake cryptogram: AES-ECB of `first || second` under S-ENC
///
/// The peripheral's cryptogram authenticates `challenge_cp || rnd_pd`; the
/// controller's response authenticates `rnd_pd || challenge_cp`.
pub fn compute_cryptogram(first: &[u8], second: &[u8], s_enc: &[u8]) -> Result<[u8; BLOCK_SIZE]> {
    let first = as_challenge(first)?;
    let second = as_challenge(second)?;
    let key = as_key(s_enc)?;

    let mut block = [0u8; BLOCK_SIZE];
    block[..CHALLENGE_SIZE].copy_from_slice(&first);
    block[CHALLENGE_SIZE..].copy_from_slice(&second);
    encrypt_block(&key, &mut block);

    Ok(block)
}

/// Generate the MAC block for a secure message
///
/// The frame bytes minus CRC and MAC placeholder are padded and CBC-chained:
/// every block but the last under `s_mac1`, the last under `s_mac2`, each
/// ciphertext feeding the next block's IV. The returned 16-byte block is
/// both the MAC source (its first 4 bytes go on the wire) and the next IV
/// of the session's chain.
///
/// # Errors
///
/// [`Error::NotSecureMessage`] for clear messages; length errors for bad
/// key or IV material.
pub fn generate_mac(
    message: &Message,
    ivc: &[u8],
    s_mac1: &[u8],
    s_mac2: &[u8],
) -> Result<[u8; BLOCK_SIZE]> {
    if !message.secure {
        return Err(Error::NotSecureMessage);
    }

    let s_mac1 = as_key(s_mac1)?;
    let s_mac2 = as_key(s_mac2)?;
    let mut iv = as_iv(ivc)?;

    let packet = message.to_packet()?;
    let mut bytes = packet.encode().to_vec();

    // The MAC covers neither the trailing CRC nor its own wire field.
    bytes.truncate(bytes.len() - 2);
    if packet.carries_mac() {
        bytes.truncate(bytes.len() - MAC_SIZE);
    }

    pad(&mut bytes);

    let (body, last) = bytes.split_at(bytes.len() - BLOCK_SIZE);
    for block in body.chunks(BLOCK_SIZE) {
        iv = cbc_encrypt_block(&s_mac1, &iv, block.try_into().expect("exact block"));
    }

    Ok(cbc_encrypt_block(
        &s_mac2,
        &iv,
        last.try_into().expect("exact block"),
    ))
}

/// Encrypt a secure message's payload in place with AES-128-CBC
///
/// Pads with the `0x80` + zero-fill scheme (a full extra block when the
/// payload is already aligned). Returns the next IV state: the final
/// ciphertext block.
pub fn encrypt_payload(message: &mut Message, key: &[u8], ivc: &[u8]) -> Result<[u8; BLOCK_SIZE]> {
    if !message.secure {
        return Err(Error::NotSecureMessage);
    }

    let key = as_key(key)?;
    let mut iv = as_iv(ivc)?;

    let mut data = message.payload.to_vec();
    pad(&mut data);

    for chunk in data.chunks_mut(BLOCK_SIZE) {
        let block: [u8; BLOCK_SIZE] = (&*chunk).try_into().expect("exact block");
        let ciphertext = cbc_encrypt_block(&key, &iv, &block);
        chunk.copy_from_slice(&ciphertext);
        iv = ciphertext;
    }

    message.payload = Bytes::from(data);
    Ok(iv)
}

/// Decrypt a secure message's payload in place and strip the padding
///
/// Returns the next IV state: the final ciphertext block of the input.
///
/// # Errors
///
/// [`Error::UnpaddedCiphertext`] when the payload is not whole blocks,
/// [`Error::InvalidPadding`] when no padding marker survives decryption.
pub fn decrypt_payload(message: &mut Message, key: &[u8], ivc: &[u8]) -> Result<[u8; BLOCK_SIZE]> {
    if !message.secure {
        return Err(Error::NotSecureMessage);
    }

    let key = as_key(key)?;
    let mut iv = as_iv(ivc)?;

    if message.payload.is_empty() || message.payload.len() % BLOCK_SIZE != 0 {
        return Err(Error::UnpaddedCiphertext {
            len: message.payload.len(),
        });
    }

    let mut data = message.payload.to_vec();
    for chunk in data.chunks_mut(BLOCK_SIZE) {
        let ciphertext: [u8; BLOCK_SIZE] = (&*chunk).try_into().expect("exact block");

        let mut block = ciphertext;
        decrypt_block(&key, &mut block);
        for (plain, chained) in block.iter_mut().zip(iv.iter()) {
            *plain ^= chained;
        }

        chunk.copy_from_slice(&block);
        iv = ciphertext;
    }

    unpad(&mut data)?;
    message.payload = Bytes::from(data);
    Ok(iv)
}

fn pad(bytes: &mut Vec<u8>) {
    bytes.push(PAD_MARKER);
    while bytes.len() % BLOCK_SIZE != 0 {
        bytes.push(0x00);
    }
}

fn unpad(bytes: &mut Vec<u8>) -> Result<()> {
    while bytes.last() == Some(&0x00) {
        bytes.pop();
    }

    match bytes.pop() {
        Some(PAD_MARKER) => Ok(()),
        _ => Err(Error::InvalidPadding),
    }
}

fn encrypt_block(key: &[u8; KEY_SIZE], block: &mut [u8; BLOCK_SIZE]) {
    let cipher = Aes128::new(key.into());
    cipher.encrypt_block(block.into());
}

fn decrypt_block(key: &[u8; KEY_SIZE], block: &mut [u8; BLOCK_SIZE]) {
    let cipher = Aes128::new(key.into());
    cipher.decrypt_block(block.into());
}

fn cbc_encrypt_block(
    key: &[u8; KEY_SIZE],
    iv: &[u8; BLOCK_SIZE],
    block: &[u8; BLOCK_SIZE],
) -> [u8; BLOCK_SIZE] {
    let mut out = *block;
    for (byte, chained) in out.iter_mut().zip(iv.iter()) {
        *byte ^= chained;
    }
    encrypt_block(key, &mut out);
    out
}

fn as_key(bytes: &[u8]) -> Result<[u8; KEY_SIZE]> {
    bytes.try_into().map_err(|_| Error::InvalidKeyLength {
        expected: KEY_SIZE,
        actual: bytes.len(),
    })
}

fn as_iv(bytes: &[u8]) -> Result<[u8; BLOCK_SIZE]> {
    bytes.try_into().map_err(|_| Error::InvalidIvLength {
        expected: BLOCK_SIZE,
        actual: bytes.len(),
    })
}

fn as_challenge(bytes: &[u8]) -> Result<[u8; CHALLENGE_SIZE]> {
    bytes.try_into().map_err(|_| Error::InvalidChallengeLength {
        expected: CHALLENGE_SIZE,
        actual: bytes.len(),
    })
}
