//! Administrator credential hashing.
//!
//! The registry authenticates its root user against a bcrypt string stored
//! both in the artifact (`security.password`) and in
//! `registry_root_security.pwd`. The hash is one-way: it is only ever checked
//! with [`HashedCredential::verify`], never reversed.

use std::fmt;

use bcrypt::Version;
use ring::rand::SystemRandom;

use crate::crypto;
use crate::error::ProvisionError;

/// bcrypt work factor for this deployment profile.
pub const BCRYPT_COST: u32 = 10;

/// bcrypt only reads this many bytes of input. Longer passwords are refused
/// rather than silently truncated.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// A self-describing bcrypt hash: `$2a$10$<22 char salt><31 char digest>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedCredential(String);

impl HashedCredential {
    /// Hash a plaintext password under a fresh 128-bit salt.
    ///
    /// Two calls on the same input yield different strings that both verify.
    /// The salt comes from the crate's single randomness source.
    pub fn hash(plaintext: &str) -> Result<Self, ProvisionError> {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Err(ProvisionError::CredentialHash(format!(
                "password is {} bytes, bcrypt accepts at most {}",
                plaintext.len(),
                MAX_PASSWORD_BYTES
            )));
        }
        let salt: [u8; 16] = crypto::random_bytes(&SystemRandom::new())?;
        let parts = bcrypt::hash_with_salt(plaintext, BCRYPT_COST, salt)
            .map_err(|e| ProvisionError::CredentialHash(e.to_string()))?;
        Ok(Self(parts.format_for_version(Version::TwoA)))
    }

    /// Wrap a hash read back from an artifact or the database.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Check `plaintext` against this hash.
    pub fn verify(&self, plaintext: &str) -> Result<bool, ProvisionError> {
        bcrypt::verify(plaintext, &self.0).map_err(|e| ProvisionError::CredentialHash(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HashedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_and_is_salted() {
        let first = HashedCredential::hash("password").unwrap();
        let second = HashedCredential::hash("password").unwrap();

        assert_ne!(first, second);
        assert!(first.verify("password").unwrap());
        assert!(second.verify("password").unwrap());
        assert!(!first.verify("Password").unwrap());
    }

    #[test]
    fn hash_is_2a_cost_10() {
        let hashed = HashedCredential::hash("s3cret").unwrap();
        assert!(hashed.as_str().starts_with("$2a$10$"));
        assert_eq!(hashed.as_str().len(), 60);
    }

    #[test]
    fn verify_accepts_hash_built_from_fixed_salt() {
        let encoded = bcrypt::hash_with_salt("password", BCRYPT_COST, [0x11; 16])
            .unwrap()
            .format_for_version(Version::TwoA);
        let again = bcrypt::hash_with_salt("password", BCRYPT_COST, [0x11; 16])
            .unwrap()
            .format_for_version(Version::TwoA);
        assert_eq!(encoded, again);

        let hashed = HashedCredential::from_encoded(encoded);
        assert!(hashed.verify("password").unwrap());
    }

    #[test]
    fn password_longer_than_bcrypt_input_is_refused() {
        let at_limit = "a".repeat(MAX_PASSWORD_BYTES);
        assert!(HashedCredential::hash(&at_limit).unwrap().verify(&at_limit).unwrap());

        let over = format!("{}X", at_limit);
        let err = HashedCredential::hash(&over).unwrap_err();
        assert!(matches!(err, ProvisionError::CredentialHash(_)));
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        let hashed = HashedCredential::from_encoded("not-a-bcrypt-hash");
        assert!(hashed.verify("password").is_err());
    }
}
