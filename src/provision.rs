//! End-to-end provisioning.
//!
//! ```text
//! SecretMaterial ──► encrypt db password ─┐
//! admin password ──► bcrypt hash ─────────┼──► self-check ──► artifact (disk)
//!                                         └──────────────────► script ──► database
//! ```
//!
//! The hash and ciphertext are computed exactly once and the same values feed
//! both outputs, so the artifact and `registry_root_security` can never
//! disagree. The artifact is written first; a write failure aborts before the
//! database is touched. A later database failure leaves the artifact on disk.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::credential::HashedCredential;
use crate::error::ProvisionError;
use crate::executor::{self, BootstrapTarget, MySqlTarget};
use crate::keys::{self, SecretMaterial};
use crate::properties::{self, key, PropertiesFile, RuntimeProperties};
use crate::script::BootstrapScript;
use crate::settings::ProvisioningRequest;

/// Everything derived for one run, ready to be written and applied.
#[derive(Clone)]
pub struct Prepared {
    material: SecretMaterial,
    credential: HashedCredential,
    encrypted_password: String,
    generated_at: DateTime<Utc>,
    document: String,
    script: BootstrapScript,
}

impl Prepared {
    /// Derive all secrets with fresh material.
    pub fn new(request: &ProvisioningRequest, generated_at: DateTime<Utc>) -> Result<Self, ProvisionError> {
        let material = SecretMaterial::generate()?;
        Self::with_material(request, material, generated_at)
    }

    /// Derive all secrets with caller-supplied material.
    ///
    /// Only the bcrypt salt is random here.
    pub fn with_material(
        request: &ProvisioningRequest,
        material: SecretMaterial,
        generated_at: DateTime<Utc>,
    ) -> Result<Self, ProvisionError> {
        let credential = HashedCredential::hash(request.admin_password())?;
        let encrypted_password = keys::encrypt_secret(&request.database().password, &material)?;

        self_check(request, &material, &credential, &encrypted_password)?;

        let document = RuntimeProperties {
            database: request.database(),
            encrypted_password: &encrypted_password,
            material: &material,
            credential: &credential,
            admin_username: request.admin_username(),
            generated_at,
        }
        .render();

        let script = BootstrapScript::build(request.admin_username(), &credential, request.settings())?;

        info!(
            admin = %request.admin_username(),
            settings = request.settings().len(),
            "derived credentials and rendered outputs"
        );

        Ok(Self {
            material,
            credential,
            encrypted_password,
            generated_at,
            document,
            script,
        })
    }

    pub fn material(&self) -> &SecretMaterial {
        &self.material
    }

    pub fn credential(&self) -> &HashedCredential {
        &self.credential
    }

    pub fn encrypted_password(&self) -> &str {
        &self.encrypted_password
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// The rendered properties document.
    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn script(&self) -> &BootstrapScript {
        &self.script
    }

    /// Write the artifact to `path`.
    pub fn write_artifact(&self, path: &Path) -> Result<(), ProvisionError> {
        properties::write_properties(path, &self.document)?;
        info!(path = %path.display(), "configuration artifact written");
        Ok(())
    }

    /// Apply the bootstrap script through `target`.
    pub async fn apply<T: BootstrapTarget>(&self, target: &mut T) -> Result<usize, ProvisionError> {
        executor::apply_script(target, &self.script).await
    }
}

impl fmt::Debug for Prepared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prepared")
            .field("material", &self.material)
            .field("generated_at", &self.generated_at)
            .field("statements", &self.script.statements().len())
            .finish_non_exhaustive()
    }
}

/// Confirm the derived secrets reverse to the inputs before anything is written.
fn self_check(
    request: &ProvisioningRequest,
    material: &SecretMaterial,
    credential: &HashedCredential,
    encrypted_password: &str,
) -> Result<(), ProvisionError> {
    if !credential.verify(request.admin_password())? {
        return Err(ProvisionError::ArtifactMismatch(
            "admin hash does not verify".into(),
        ));
    }
    let decrypted = keys::decrypt_secret(encrypted_password, material)?;
    if decrypted.as_str() != request.database().password.as_str() {
        return Err(ProvisionError::ArtifactMismatch(
            "database password does not decrypt".into(),
        ));
    }
    Ok(())
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub prepared: Prepared,
    /// `None` when the database step was skipped.
    pub statements_applied: Option<usize>,
}

/// Provision a registry: derive secrets, write the artifact, bootstrap MySQL.
///
/// Every failure is terminal. With `skip_database` only the artifact is
/// produced.
pub async fn run(request: &ProvisioningRequest, skip_database: bool) -> Result<Outcome, ProvisionError> {
    run_with(request, skip_database, |_| {}).await
}

/// As [`run`], calling `on_written` once the artifact is on disk and before
/// the database is contacted.
pub async fn run_with(
    request: &ProvisioningRequest,
    skip_database: bool,
    on_written: impl FnOnce(&Prepared),
) -> Result<Outcome, ProvisionError> {
    let prepared = Prepared::new(request, Utc::now())?;
    prepared.write_artifact(request.output_path())?;
    on_written(&prepared);

    if skip_database {
        info!("database bootstrap skipped");
        return Ok(Outcome {
            prepared,
            statements_applied: None,
        });
    }

    let mut target = MySqlTarget::connect(request.database()).await?;
    let applied = prepared.apply(&mut target).await?;
    target.close().await?;

    Ok(Outcome {
        prepared,
        statements_applied: Some(applied),
    })
}

/// Check an existing artifact against the configured inputs.
///
/// Re-derives the key from `encrypt.salt` / `encrypt.password`, decrypts
/// `database.password` and verifies `security.password`, exactly as the
/// registry runtime would on start-up.
pub fn verify_artifact(
    artifact: &PropertiesFile,
    request: &ProvisioningRequest,
) -> Result<(), ProvisionError> {
    let material = SecretMaterial::from_parts(
        artifact.require(key::ENCRYPT_SALT)?,
        artifact.require(key::ENCRYPT_PASSWORD)?,
    );

    let decrypted = keys::decrypt_secret(artifact.require(key::DATABASE_PASSWORD)?, &material)?;
    if decrypted.as_str() != request.database().password.as_str() {
        return Err(ProvisionError::ArtifactMismatch(
            "database.password does not decrypt to the configured password".into(),
        ));
    }

    let credential = HashedCredential::from_encoded(artifact.require(key::SECURITY_PASSWORD)?);
    if !credential.verify(request.admin_password())? {
        return Err(ProvisionError::ArtifactMismatch(
            "security.password does not verify against the configured password".into(),
        ));
    }

    let expected = [
        (key::SECURITY_USERNAME, request.admin_username().to_string()),
        (key::DATABASE_USERNAME, request.database().username.clone()),
        (key::DATABASE_URL, request.database().jdbc_url()),
    ];
    for (name, value) in expected {
        if artifact.require(name)? != value {
            return Err(ProvisionError::ArtifactMismatch(format!(
                "{} does not match the configured value",
                name
            )));
        }
    }

    info!("configuration artifact verified");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{DatabaseCoordinates, RegistryProfile};

    fn request() -> ProvisioningRequest {
        ProvisioningRequest::new(
            "root",
            "password",
            DatabaseCoordinates::default(),
            &RegistryProfile::default(),
            "/tmp/unused.properties",
        )
        .unwrap()
    }

    #[test]
    fn prepared_outputs_share_one_hash() {
        let prepared = Prepared::new(&request(), Utc::now()).unwrap();
        let hash = prepared.credential().as_str();
        assert!(prepared.document().contains(&format!("security.password={}\n", hash)));
        assert!(prepared.script().as_str().contains(&format!("'-1', '{}');", hash)));
    }

    #[test]
    fn verify_rejects_wrong_database_password() {
        let prepared = Prepared::new(&request(), Utc::now()).unwrap();
        let artifact = PropertiesFile::parse(prepared.document());

        let other = ProvisioningRequest::new(
            "root",
            "password",
            DatabaseCoordinates {
                password: String::from("different").into(),
                ..DatabaseCoordinates::default()
            },
            &RegistryProfile::default(),
            "/tmp/unused.properties",
        )
        .unwrap();
        assert!(verify_artifact(&artifact, &other).is_err());
        verify_artifact(&artifact, &request()).unwrap();
    }
}
