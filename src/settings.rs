//! Provisioning inputs.
//!
//! Everything a run needs is collected once into a [`ProvisioningRequest`]
//! and passed by reference to each stage. Nothing in the library reads the
//! process environment; the binary maps flags and environment variables onto
//! these types.

use std::fmt;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use crate::credential::MAX_PASSWORD_BYTES;
use crate::error::ProvisionError;

/// Documented defaults for every named input.
pub mod defaults {
    pub const ADMIN_USERNAME: &str = "root";
    pub const ADMIN_PASSWORD: &str = "password";
    pub const DATABASE_NAME: &str = "fusion_registry";
    pub const DATABASE_USERNAME: &str = "fmr_user";
    pub const DATABASE_PASSWORD: &str = "fmr_password";
    pub const DATABASE_HOST: &str = "mariadb";
    pub const DATABASE_PORT: u16 = 3306;
    pub const REGISTRY_NAME: &str = "Fusion Metadata Registry";
    pub const REGISTRY_PROTOCOL: &str = "http";
    pub const REGISTRY_HOST: &str = "localhost";
    pub const REGISTRY_PORT: u16 = 80;
    pub const DEFAULT_AGENCY: &str = "SDMX";
    pub const SUPPORT_EMAIL: &str = "support@metadatatechnology.com";
    pub const SUPPORT_URL: &str = "https://fmrwiki.sdmxcloud.org/Main_Page";
    pub const COLOUR: &str = "#1AC6A9";
    pub const OUTPUT_PATH: &str = "/app/output/fmr.properties";
}

// ---------------------------------------------------------------------------
// Database coordinates
// ---------------------------------------------------------------------------

/// Where the registry database lives and how to log in to it.
#[derive(Clone)]
pub struct DatabaseCoordinates {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub username: String,
    pub password: Zeroizing<String>,
}

impl DatabaseCoordinates {
    /// The JDBC URL the registry runtime connects with (unescaped).
    pub fn jdbc_url(&self) -> String {
        format!("jdbc:mysql://{}:{}/{}", self.host, self.port, self.name)
    }
}

impl Default for DatabaseCoordinates {
    fn default() -> Self {
        Self {
            host: defaults::DATABASE_HOST.to_string(),
            port: defaults::DATABASE_PORT,
            name: defaults::DATABASE_NAME.to_string(),
            username: defaults::DATABASE_USERNAME.to_string(),
            password: Zeroizing::new(defaults::DATABASE_PASSWORD.to_string()),
        }
    }
}

impl fmt::Debug for DatabaseCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCoordinates")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry endpoint
// ---------------------------------------------------------------------------

/// The public address of the registry, stored as the `registry.url` setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEndpoint {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl RegistryEndpoint {
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
        }
    }

    /// Compose `<protocol>://<host>[:<port>]`.
    ///
    /// The port is omitted only when it is the protocol's own default
    /// (80 for http, 443 for https).
    pub fn url(&self) -> String {
        let default_port = match self.protocol.to_ascii_lowercase().as_str() {
            "http" => Some(80),
            "https" => Some(443),
            _ => None,
        };
        if default_port == Some(self.port) {
            format!("{}://{}", self.protocol, self.host)
        } else {
            format!("{}://{}:{}", self.protocol, self.host, self.port)
        }
    }
}

impl Default for RegistryEndpoint {
    fn default() -> Self {
        Self::new(
            defaults::REGISTRY_PROTOCOL,
            defaults::REGISTRY_HOST,
            defaults::REGISTRY_PORT,
        )
    }
}

// ---------------------------------------------------------------------------
// Registry settings
// ---------------------------------------------------------------------------

/// The operator-overridable parts of the settings table.
#[derive(Debug, Clone)]
pub struct RegistryProfile {
    pub name: String,
    pub endpoint: RegistryEndpoint,
    pub default_agency: String,
    pub support_email: String,
    pub support_url: String,
    pub colour: String,
}

impl Default for RegistryProfile {
    fn default() -> Self {
        Self {
            name: defaults::REGISTRY_NAME.to_string(),
            endpoint: RegistryEndpoint::default(),
            default_agency: defaults::DEFAULT_AGENCY.to_string(),
            support_email: defaults::SUPPORT_EMAIL.to_string(),
            support_url: defaults::SUPPORT_URL.to_string(),
            colour: defaults::COLOUR.to_string(),
        }
    }
}

/// Named runtime settings seeded into `registry_settings`.
///
/// Insertion order is preserved and decides INSERT row order only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySettings {
    entries: Vec<(String, String)>,
}

impl RegistrySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full settings table for a profile, in the registry's canonical order.
    pub fn from_profile(profile: &RegistryProfile) -> Self {
        let mut settings = Self::new();
        settings.insert("agree.licence", "true");
        settings.insert("default.agency", profile.default_agency.as_str());
        settings.insert("http.request.useragent", "FusionRegistry/${version}");
        settings.insert("installed.version", "11.0.0");
        settings.insert("registry.name", profile.name.as_str());
        settings.insert("registry.url", profile.endpoint.url());
        settings.insert("security.auth.prov", "registry");
        settings.insert("registry.colour", profile.colour.as_str());
        settings.insert("registry.supportemail", profile.support_email.as_str());
        settings.insert("registry.supporturl", profile.support_url.as_str());
        settings
    }

    /// Set a value. An existing name keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Everything one provisioning run needs. Immutable once constructed.
#[derive(Clone)]
pub struct ProvisioningRequest {
    admin_username: String,
    admin_password: Zeroizing<String>,
    database: DatabaseCoordinates,
    settings: RegistrySettings,
    output_path: PathBuf,
}

impl ProvisioningRequest {
    /// Build and validate a request.
    ///
    /// Empty credentials, database name or host are rejected here, before any
    /// secret is generated, as is an admin password too long for bcrypt.
    pub fn new(
        admin_username: impl Into<String>,
        admin_password: impl Into<String>,
        database: DatabaseCoordinates,
        profile: &RegistryProfile,
        output_path: impl Into<PathBuf>,
    ) -> Result<Self, ProvisionError> {
        let request = Self {
            admin_username: admin_username.into(),
            admin_password: Zeroizing::new(admin_password.into()),
            database,
            settings: RegistrySettings::from_profile(profile),
            output_path: output_path.into(),
        };
        request.validate()?;
        Ok(request)
    }

    /// Replace the settings table wholesale.
    pub fn with_settings(mut self, settings: RegistrySettings) -> Self {
        self.settings = settings;
        self
    }

    fn validate(&self) -> Result<(), ProvisionError> {
        let required = [
            ("admin username", self.admin_username.as_str()),
            ("admin password", self.admin_password.as_str()),
            ("database name", self.database.name.as_str()),
            ("database username", self.database.username.as_str()),
            ("database password", self.database.password.as_str()),
            ("database host", self.database.host.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ProvisionError::InvalidInput(format!("{} must not be empty", field)));
            }
        }
        if self.admin_password.len() > MAX_PASSWORD_BYTES {
            return Err(ProvisionError::InvalidInput(format!(
                "admin password must be at most {} bytes",
                MAX_PASSWORD_BYTES
            )));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ProvisionError::InvalidInput("output path must not be empty".into()));
        }
        Ok(())
    }

    pub fn admin_username(&self) -> &str {
        &self.admin_username
    }

    pub fn admin_password(&self) -> &str {
        &self.admin_password
    }

    pub fn database(&self) -> &DatabaseCoordinates {
        &self.database
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

impl fmt::Debug for ProvisioningRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningRequest")
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"<redacted>")
            .field("database", &self.database)
            .field("settings", &self.settings.len())
            .field("output_path", &self.output_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_omits_default_ports() {
        assert_eq!(
            RegistryEndpoint::new("http", "example.com", 80).url(),
            "http://example.com"
        );
        assert_eq!(
            RegistryEndpoint::new("http", "example.com", 8080).url(),
            "http://example.com:8080"
        );
        assert_eq!(
            RegistryEndpoint::new("https", "example.com", 443).url(),
            "https://example.com"
        );
    }

    #[test]
    fn url_keeps_port_that_belongs_to_other_scheme() {
        assert_eq!(
            RegistryEndpoint::new("https", "example.com", 80).url(),
            "https://example.com:80"
        );
        assert_eq!(
            RegistryEndpoint::new("http", "example.com", 443).url(),
            "http://example.com:443"
        );
    }

    #[test]
    fn default_settings_follow_canonical_order() {
        let settings = RegistrySettings::from_profile(&RegistryProfile::default());
        let names: Vec<&str> = settings.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec![
                "agree.licence",
                "default.agency",
                "http.request.useragent",
                "installed.version",
                "registry.name",
                "registry.url",
                "security.auth.prov",
                "registry.colour",
                "registry.supportemail",
                "registry.supporturl",
            ]
        );
        assert_eq!(settings.get("registry.url"), Some("http://localhost"));
        assert_eq!(settings.get("default.agency"), Some("SDMX"));
    }

    #[test]
    fn insert_overwrites_in_place() {
        let mut settings = RegistrySettings::new();
        settings.insert("a", "1");
        settings.insert("b", "2");
        settings.insert("a", "3");
        let pairs: Vec<_> = settings.iter().collect();
        assert_eq!(pairs, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn empty_admin_password_is_rejected() {
        let result = ProvisioningRequest::new(
            "root",
            "",
            DatabaseCoordinates::default(),
            &RegistryProfile::default(),
            "/tmp/fmr.properties",
        );
        assert!(matches!(result, Err(ProvisionError::InvalidInput(_))));
    }

    #[test]
    fn overlong_admin_password_is_rejected() {
        let build = |password: String| {
            ProvisioningRequest::new(
                "root",
                password,
                DatabaseCoordinates::default(),
                &RegistryProfile::default(),
                "/tmp/fmr.properties",
            )
        };
        assert!(build("a".repeat(MAX_PASSWORD_BYTES)).is_ok());
        let result = build(format!("{}X", "a".repeat(MAX_PASSWORD_BYTES)));
        assert!(matches!(result, Err(ProvisionError::InvalidInput(_))));
    }

    #[test]
    fn empty_database_name_is_rejected() {
        let database = DatabaseCoordinates {
            name: "  ".into(),
            ..DatabaseCoordinates::default()
        };
        let result = ProvisioningRequest::new(
            "root",
            "password",
            database,
            &RegistryProfile::default(),
            "/tmp/fmr.properties",
        );
        assert!(matches!(result, Err(ProvisionError::InvalidInput(_))));
    }

    #[test]
    fn debug_redacts_passwords() {
        let request = ProvisioningRequest::new(
            "root",
            "hunter2",
            DatabaseCoordinates::default(),
            &RegistryProfile::default(),
            "/tmp/fmr.properties",
        )
        .unwrap();
        let rendered = format!("{:?}", request);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains(defaults::DATABASE_PASSWORD));
    }
}
