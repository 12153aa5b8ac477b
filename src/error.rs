//! Error types for fmr-init.
//!
//! Every variant is a distinct, terminal failure mode of a provisioning run.
//! There is no retry anywhere: the operator fixes the cause and re-runs.
//! Messages for the cryptographic variants are intentionally minimal. They
//! signal *what* failed and never carry key material or plaintext.

use std::fmt;
use std::path::PathBuf;

/// The single error type for all fmr-init operations.
#[derive(Debug)]
pub enum ProvisionError {
    /// A required input was empty or otherwise unusable.
    InvalidInput(String),

    /// The system's random number generator failed to produce bytes.
    RandomnessFailure,

    /// PBKDF2 key derivation failed.
    KeyDerivationFailure,

    /// AES encryption of the database secret failed.
    EncryptionFailure,

    /// Decryption failed: bad base64, wrong key, or malformed padding.
    DecryptionFailure,

    /// bcrypt hashing or verification of the admin credential failed.
    CredentialHash(String),

    /// A value destined for the bootstrap SQL contains characters that would
    /// corrupt the statement.
    UnsafeSqlLiteral {
        field: String,
        reason: &'static str,
    },

    /// A filesystem operation on the configuration artifact failed.
    Io {
        operation: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    /// Opening the database connection failed. Nothing has been mutated.
    DatabaseConnection(sqlx::Error),

    /// A bootstrap statement failed. The transaction has been rolled back.
    Statement {
        index: usize,
        statement: String,
        source: sqlx::Error,
    },

    /// Beginning, committing or rolling back the bootstrap transaction failed.
    Transaction {
        operation: &'static str,
        source: sqlx::Error,
    },

    /// The derived secrets do not verify against the inputs they came from.
    ArtifactMismatch(String),
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(reason) => write!(f, "invalid input: {}", reason),
            Self::RandomnessFailure => write!(f, "randomness source failed"),
            Self::KeyDerivationFailure => write!(f, "key derivation failed"),
            Self::EncryptionFailure => write!(f, "encryption failed"),
            Self::DecryptionFailure => write!(f, "decryption failed"),
            Self::CredentialHash(reason) => write!(f, "credential hashing failed: {}", reason),
            Self::UnsafeSqlLiteral { field, reason } => {
                write!(f, "unsafe value for {} in bootstrap SQL: {}", field, reason)
            }
            Self::Io {
                operation,
                path,
                source,
            } => write!(f, "{} {}: {}", operation, path.display(), source),
            Self::DatabaseConnection(source) => {
                write!(f, "database connection failed: {}", source)
            }
            Self::Statement {
                index,
                statement,
                source,
            } => write!(
                f,
                "bootstrap statement #{} failed ({}): {}",
                index + 1,
                statement,
                source
            ),
            Self::Transaction { operation, source } => {
                write!(f, "transaction {} failed: {}", operation, source)
            }
            Self::ArtifactMismatch(reason) => write!(f, "artifact mismatch: {}", reason),
        }
    }
}

impl std::error::Error for ProvisionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::DatabaseConnection(source)
            | Self::Statement { source, .. }
            | Self::Transaction { source, .. } => Some(source),
            _ => None,
        }
    }
}
