//! Secret material, key derivation and key ownership.
//!
//! This module owns three responsibilities:
//! 1. Generating the per-run `encrypt.salt` / `encrypt.password` pair.
//! 2. Deriving the AES key from that pair with PBKDF2-HMAC-SHA256.
//! 3. Holding key material in types that are opaque, non-cloneable, and
//!    zeroised on drop.
//!
//! ## Derivation structure
//!
//! ```text
//! PBKDF2-HMAC-SHA256(
//!     password   = utf8(encrypt.password),
//!     salt       = utf8(encrypt.salt),
//!     iterations = 1000,
//!     dklen      = 32
//! )
//! ```
//!
//! The iteration count is part of the decrypting runtime's contract and is
//! not configurable. The derived key is never stored; anyone holding the two
//! identifiers from the artifact recomputes it on demand.

use std::fmt;
use std::num::NonZeroU32;

use ring::pbkdf2;
use ring::rand::SystemRandom;
use uuid::Builder;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{self, KEY_LEN};
use crate::error::ProvisionError;

/// PBKDF2 iteration count expected by the registry runtime.
pub const PBKDF2_ITERATIONS: u32 = 1000;

// ---------------------------------------------------------------------------
// Secret material
// ---------------------------------------------------------------------------

/// The two random identifiers generated once per provisioning run.
///
/// Both are 128-bit CSPRNG values rendered as canonical lowercase UUIDs.
/// They are written in the clear to the configuration artifact and nowhere
/// else.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretMaterial {
    encrypt_salt: String,
    encrypt_password: String,
}

impl SecretMaterial {
    /// Generate a fresh, independent salt/passphrase pair.
    pub fn generate() -> Result<Self, ProvisionError> {
        let rng = SystemRandom::new();
        Ok(Self {
            encrypt_salt: random_uuid(&rng)?,
            encrypt_password: random_uuid(&rng)?,
        })
    }

    /// Rebuild material read back from an existing artifact.
    pub fn from_parts(encrypt_salt: impl Into<String>, encrypt_password: impl Into<String>) -> Self {
        Self {
            encrypt_salt: encrypt_salt.into(),
            encrypt_password: encrypt_password.into(),
        }
    }

    pub fn encrypt_salt(&self) -> &str {
        &self.encrypt_salt
    }

    pub fn encrypt_password(&self) -> &str {
        &self.encrypt_password
    }

    /// Derive the 256-bit AES key for this material.
    pub fn derive_key(&self) -> Result<DerivedKey, ProvisionError> {
        derive_key(&self.encrypt_salt, &self.encrypt_password)
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("encrypt_salt", &"<redacted>")
            .field("encrypt_password", &"<redacted>")
            .finish()
    }
}

fn random_uuid(rng: &SystemRandom) -> Result<String, ProvisionError> {
    let bytes: [u8; 16] = crypto::random_bytes(rng)?;
    // Sets the version 4 and RFC 4122 variant bits.
    Ok(Builder::from_random_bytes(bytes).into_uuid().to_string())
}

// ---------------------------------------------------------------------------
// Derived key
// ---------------------------------------------------------------------------

/// The AES-256 key derived from a `SecretMaterial` pair.
///
/// - Not `Clone`.
/// - Zeroised on drop.
/// - Raw bytes are `pub(crate)` only.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

/// Derive a key from a salt and passphrase.
///
/// Both are used as their UTF-8 bytes, exactly as the runtime does.
pub fn derive_key(encrypt_salt: &str, encrypt_password: &str) -> Result<DerivedKey, ProvisionError> {
    let iterations =
        NonZeroU32::new(PBKDF2_ITERATIONS).ok_or(ProvisionError::KeyDerivationFailure)?;

    let mut bytes = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        encrypt_salt.as_bytes(),
        encrypt_password.as_bytes(),
        &mut bytes,
    );
    Ok(DerivedKey { bytes })
}

// ---------------------------------------------------------------------------
// Secret encryption
// ---------------------------------------------------------------------------

/// Encrypt the database password for the artifact.
///
/// PKCS5 pad, AES-256-ECB under the derived key, base64.
pub fn encrypt_secret(plaintext: &str, material: &SecretMaterial) -> Result<String, ProvisionError> {
    let key = material.derive_key()?;
    let ciphertext = crypto::encrypt(key.as_bytes(), plaintext.as_bytes())?;
    Ok(crypto::encode(&ciphertext))
}

/// Reverse [`encrypt_secret`] the way the registry runtime does.
pub fn decrypt_secret(encoded: &str, material: &SecretMaterial) -> Result<String, ProvisionError> {
    let key = material.derive_key()?;
    let ciphertext = crypto::decode(encoded)?;
    let plaintext = crypto::decrypt(key.as_bytes(), &ciphertext)?;
    String::from_utf8(plaintext).map_err(|_| ProvisionError::DecryptionFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: &str = "3f1c2b8e-6a4d-4e2f-9b7a-1c2d3e4f5a6b";
    const PASS: &str = "9d8c7b6a-5f4e-4d3c-8b2a-0f1e2d3c4b5a";

    #[test]
    fn derive_key_matches_known_vector() {
        let key = derive_key(SALT, PASS).unwrap();
        let hex: String = key.as_bytes().iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(
            hex,
            "4f0994960d06f761d04d4cd02abda89323dc4cd8bb82225a183ca8c48f6c6bbe"
        );
    }

    #[test]
    fn encrypt_secret_matches_runtime_vectors() {
        let material = SecretMaterial::from_parts(SALT, PASS);
        assert_eq!(
            encrypt_secret("fmr_password", &material).unwrap(),
            "MeFWkGlTeXw8YPnTPAM2lA=="
        );
        assert_eq!(
            encrypt_secret("0123456789abcdef", &material).unwrap(),
            "37TVoWVjCYIfSPmhaPIcV5FTWQmMUgjukw2DJ1Ak4b4="
        );
        assert_eq!(encrypt_secret("", &material).unwrap(), "kVNZCYxSCO6TDYMnUCThvg==");
    }

    #[test]
    fn generated_material_is_canonical_uuid_v4() {
        let material = SecretMaterial::generate().unwrap();
        for value in [material.encrypt_salt(), material.encrypt_password()] {
            let parsed = uuid::Uuid::parse_str(value).unwrap();
            assert_eq!(parsed.get_version_num(), 4);
            assert_eq!(parsed.to_string(), value);
        }
        assert_ne!(material.encrypt_salt(), material.encrypt_password());
    }

    #[test]
    fn debug_output_redacts_material() {
        let material = SecretMaterial::from_parts(SALT, PASS);
        let rendered = format!("{:?}", material);
        assert!(!rendered.contains(SALT));
        assert!(!rendered.contains(PASS));
    }
}
