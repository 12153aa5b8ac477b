//! # fmr-init
//!
//! First-run provisioning for a metadata registry.
//!
//! A run derives the administrator's bcrypt credential, encrypts the
//! database password under a key derived from freshly generated material,
//! writes the registry's runtime properties file, and bootstraps the
//! registry schema and seed rows in one database transaction.
//!
//! The artifact and the database are written from the same derived values,
//! and the artifact alone is enough to recompute the decryption key later.
//!
//! ## Public API
//!
//! Callers normally need only [`ProvisioningRequest`], [`provision::run`]
//! and [`provision::verify_artifact`]. The lower layers are public so each
//! stage can be exercised on its own.

// Module declarations.
pub(crate) mod crypto;
pub mod credential;
pub mod error;
pub mod executor;
pub mod keys;
pub mod properties;
pub mod provision;
pub mod script;
pub mod settings;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub use credential::HashedCredential;
pub use error::ProvisionError;
pub use keys::SecretMaterial;
pub use provision::{Outcome, Prepared};
pub use script::BootstrapScript;
pub use settings::{DatabaseCoordinates, ProvisioningRequest, RegistryEndpoint, RegistryProfile};

/// Generate fresh `encrypt.salt` / `encrypt.password` material.
///
/// This is the only entry point that produces new key material. Everything
/// downstream is deterministic given the material, except the bcrypt salt.
pub fn generate_secret_material() -> Result<SecretMaterial, ProvisionError> {
    SecretMaterial::generate()
}
