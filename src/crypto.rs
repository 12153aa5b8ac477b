//! Low-level cryptographic operations.
//!
//! This module is one of exactly two places in the crate that touch raw key
//! bytes (the other is `keys`). All other modules encrypt and decrypt
//! exclusively through the functions exposed here or in `keys`.
//!
//! Primitive choices are fixed by the registry runtime that decrypts the
//! artifact, not by this crate:
//! - **Cipher**: AES-256 in ECB mode (no IV, no chaining, no authentication)
//! - **Padding**: PKCS5, always at least one byte, a full block when aligned
//! - **Encoding**: standard base64 with padding
//! - **Randomness**: `ring::rand::SystemRandom`, the only source in the crate

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::ProvisionError;

/// AES block size in bytes.
pub const BLOCK_LEN: usize = 16;

/// Size of a derived key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Generate `N` bytes from the system CSPRNG.
///
/// There is no fallback and no retry: a failing randomness source aborts the
/// run before anything is written.
pub fn random_bytes<const N: usize>(rng: &SystemRandom) -> Result<[u8; N], ProvisionError> {
    let mut buf = [0u8; N];
    rng.fill(&mut buf).map_err(|_| ProvisionError::RandomnessFailure)?;
    Ok(buf)
}

/// Apply PKCS5 padding.
///
/// Appends `n` bytes of value `n` where `n = 16 - (len % 16)`. An input that
/// is already block-aligned still gets a full block of `0x10`, so the reader
/// can always strip exactly one pad.
pub fn pad(data: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_LEN - data.len() % BLOCK_LEN;
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    // pad_len is in 1..=16
    padded.resize(data.len() + pad_len, pad_len as u8);
    padded
}

/// Strip PKCS5 padding added by [`pad`].
pub fn unpad(data: &[u8]) -> Result<&[u8], ProvisionError> {
    if data.is_empty() || data.len() % BLOCK_LEN != 0 {
        return Err(ProvisionError::DecryptionFailure);
    }
    let pad_len = usize::from(data[data.len() - 1]);
    if pad_len == 0 || pad_len > BLOCK_LEN {
        return Err(ProvisionError::DecryptionFailure);
    }
    let (body, padding) = data.split_at(data.len() - pad_len);
    if padding.iter().any(|&b| usize::from(b) != pad_len) {
        return Err(ProvisionError::DecryptionFailure);
    }
    Ok(body)
}

/// Encrypt `plaintext` with AES-256-ECB after PKCS5 padding.
///
/// Deterministic: the same key and plaintext always produce the same
/// ciphertext. Randomness lives in the key material, not here.
///
/// # Layout of returned bytes
/// ```text
/// [ E(block 0) ][ E(block 1) ] ... [ E(last block incl. padding) ]
/// ```
pub fn encrypt(key_bytes: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>, ProvisionError> {
    let cipher =
        Aes256::new_from_slice(key_bytes).map_err(|_| ProvisionError::EncryptionFailure)?;

    let mut buffer = pad(plaintext);
    for block in buffer.chunks_exact_mut(BLOCK_LEN) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(buffer)
}

/// Decrypt AES-256-ECB ciphertext and strip its padding.
///
/// ECB carries no authentication tag. A wrong key is only detected when the
/// recovered padding happens to be malformed, so callers must not treat a
/// successful return as proof that the key was right.
pub fn decrypt(key_bytes: &[u8; KEY_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, ProvisionError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(ProvisionError::DecryptionFailure);
    }
    let cipher =
        Aes256::new_from_slice(key_bytes).map_err(|_| ProvisionError::DecryptionFailure)?;

    let mut buffer = ciphertext.to_vec();
    for block in buffer.chunks_exact_mut(BLOCK_LEN) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
    let body_len = unpad(&buffer)?.len();
    buffer.truncate(body_len);
    Ok(buffer)
}

/// Base64-encode ciphertext for embedding in a text artifact.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Reverse [`encode`].
pub fn decode(text: &str) -> Result<Vec<u8>, ProvisionError> {
    STANDARD
        .decode(text.trim())
        .map_err(|_| ProvisionError::DecryptionFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pad_appends_full_block_when_aligned() {
        let padded = pad(&[7u8; 16]);
        assert_eq!(padded.len(), 32);
        assert!(padded[16..].iter().all(|&b| b == 16));
        assert_eq!(unpad(&padded).unwrap(), &[7u8; 16]);
    }

    #[test]
    fn pad_empty_input_is_one_block() {
        let padded = pad(b"");
        assert_eq!(padded, vec![16u8; 16]);
        assert!(unpad(&padded).unwrap().is_empty());
    }

    #[test]
    fn unpad_rejects_malformed_padding() {
        let mut padded = pad(b"hello");
        let last = padded.len() - 1;
        padded[last - 1] = 0x00;
        assert!(unpad(&padded).is_err());

        assert!(unpad(&[0u8; 16]).is_err());
        assert!(unpad(&[17u8; 16]).is_err());
        assert!(unpad(&[1u8; 15]).is_err());
        assert!(unpad(&[]).is_err());
    }

    #[test]
    fn ecb_encrypts_identical_blocks_identically() {
        let key = [9u8; KEY_LEN];
        let ciphertext = encrypt(&key, &[b'a'; 32]).unwrap();
        assert_eq!(ciphertext.len(), 48);
        assert_eq!(ciphertext[..16], ciphertext[16..32]);
    }

    #[test]
    fn decrypt_rejects_truncated_ciphertext() {
        let key = [3u8; KEY_LEN];
        let ciphertext = encrypt(&key, b"secret").unwrap();
        assert!(decrypt(&key, &ciphertext[..15]).is_err());
        assert!(decrypt(&key, &[]).is_err());
    }

    #[test]
    fn random_bytes_are_not_constant() {
        let rng = SystemRandom::new();
        let a: [u8; 16] = random_bytes(&rng).unwrap();
        let b: [u8; 16] = random_bytes(&rng).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(decode("not base64!").is_err());
        assert_eq!(decode(&encode(b"abc")).unwrap(), b"abc");
    }

    proptest! {
        #[test]
        fn pad_round_trips_every_length(data in prop::collection::vec(any::<u8>(), 0..100)) {
            let padded = pad(&data);
            prop_assert_eq!(padded.len() % BLOCK_LEN, 0);
            prop_assert!(padded.len() > data.len());
            prop_assert!(padded.len() - data.len() <= BLOCK_LEN);
            prop_assert_eq!(unpad(&padded).unwrap(), &data[..]);
        }

        #[test]
        fn cipher_round_trips(
            key in prop::array::uniform32(any::<u8>()),
            data in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let ciphertext = encrypt(&key, &data).unwrap();
            prop_assert_eq!(ciphertext.len(), pad(&data).len());
            prop_assert_eq!(decrypt(&key, &ciphertext).unwrap(), data);
        }
    }
}
