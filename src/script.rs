//! Database bootstrap script.
//!
//! The script drops and recreates the registry tables and seeds the root
//! security row and the settings table. Values are embedded as SQL string
//! literals rather than bound parameters because downstream tooling consumes
//! the rendered text. Every embedded value goes through [`SqlLiteral`],
//! which is the only place untrusted text enters the SQL.

use std::fmt;

use crate::credential::HashedCredential;
use crate::error::ProvisionError;
use crate::settings::RegistrySettings;

/// Tables created by the script, in creation order.
pub const TABLES: [&str; 6] = [
    "registry_certificate",
    "registry_certificate_orgs",
    "registry_environment",
    "registry_roles_mapping",
    "registry_root_security",
    "registry_settings",
];

const SCHEMA: &str = "\
SET NAMES utf8mb4;
SET FOREIGN_KEY_CHECKS = 0;

DROP TABLE IF EXISTS `registry_certificate`;
CREATE TABLE `registry_certificate` (
  `cname` varchar(255) NOT NULL,
  `is_admin` int(11) NOT NULL,
  `display_name` varchar(255) NOT NULL,
  `email` varchar(255) NOT NULL,
  PRIMARY KEY (`cname`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8;

DROP TABLE IF EXISTS `registry_certificate_orgs`;
CREATE TABLE `registry_certificate_orgs` (
  `cname` varchar(255) NOT NULL,
  `urn` varchar(255) DEFAULT NULL,
  KEY `FK42kwu95vfd9xlmxwkrslfof08` (`cname`),
  CONSTRAINT `FK42kwu95vfd9xlmxwkrslfof08` FOREIGN KEY (`cname`) REFERENCES `registry_certificate` (`cname`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8;

DROP TABLE IF EXISTS `registry_environment`;
CREATE TABLE `registry_environment` (
  `id` varchar(255) NOT NULL,
  `name` longtext NOT NULL,
  `url` longtext NOT NULL,
  PRIMARY KEY (`id`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8;

DROP TABLE IF EXISTS `registry_roles_mapping`;
CREATE TABLE `registry_roles_mapping` (
  `alias` varchar(255) NOT NULL,
  `urn` longtext NOT NULL,
  PRIMARY KEY (`alias`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8;

DROP TABLE IF EXISTS `registry_root_security`;
CREATE TABLE `registry_root_security` (
  `username` varchar(255) NOT NULL,
  `is_locked` int(11) NOT NULL,
  `max_login` int(11) NOT NULL,
  `pwd` varchar(255) NOT NULL,
  PRIMARY KEY (`username`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8;

DROP TABLE IF EXISTS `registry_settings`;
CREATE TABLE `registry_settings` (
  `name` varchar(50) NOT NULL,
  `value` longtext NOT NULL,
  PRIMARY KEY (`name`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8;

SET FOREIGN_KEY_CHECKS = 1;
";

// ---------------------------------------------------------------------------
// Untrusted text embedding
// ---------------------------------------------------------------------------

/// A value that has been checked for safe embedding in a quoted SQL literal.
///
/// Values are rejected, never rewritten, so an accepted value renders exactly
/// as given. Rejected: `'` (ends the literal), `\` (MySQL escape), `;` (splits
/// the statement) and control characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlLiteral<'a>(&'a str);

impl<'a> SqlLiteral<'a> {
    pub fn new(field: &str, value: &'a str) -> Result<Self, ProvisionError> {
        let reason = value.chars().find_map(|c| match c {
            '\'' => Some("contains a single quote"),
            '\\' => Some("contains a backslash"),
            ';' => Some("contains a statement terminator"),
            c if c.is_control() => Some("contains a control character"),
            _ => None,
        });
        match reason {
            Some(reason) => Err(ProvisionError::UnsafeSqlLiteral {
                field: field.to_string(),
                reason,
            }),
            None => Ok(Self(value)),
        }
    }
}

impl fmt::Display for SqlLiteral<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.0)
    }
}

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// A rendered bootstrap script. Built once, executed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapScript {
    text: String,
}

impl BootstrapScript {
    /// Assemble schema DDL plus the seed INSERTs.
    ///
    /// The settings INSERT is a single multi-row statement in settings order;
    /// it is left out entirely when there are no settings.
    pub fn build(
        admin_username: &str,
        credential: &HashedCredential,
        settings: &RegistrySettings,
    ) -> Result<Self, ProvisionError> {
        let mut text = String::from(SCHEMA);

        text.push('\n');
        text.push_str(&root_security_insert(admin_username, credential)?);
        text.push('\n');

        if !settings.is_empty() {
            text.push('\n');
            text.push_str(&settings_insert(settings)?);
            text.push('\n');
        }

        Ok(Self { text })
    }

    /// Wrap SQL rendered elsewhere, such as a script saved by an earlier run.
    pub fn from_sql(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The individual statements, terminator stripped, empties dropped.
    pub fn statements(&self) -> Vec<&str> {
        split_statements(&self.text)
    }
}

impl fmt::Display for BootstrapScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn root_security_insert(
    admin_username: &str,
    credential: &HashedCredential,
) -> Result<String, ProvisionError> {
    let username = SqlLiteral::new("admin username", admin_username)?;
    let pwd = SqlLiteral::new("admin password hash", credential.as_str())?;
    Ok(format!(
        "INSERT INTO `registry_root_security` VALUES ({}, '0', '-1', {});",
        username, pwd
    ))
}

fn settings_insert(settings: &RegistrySettings) -> Result<String, ProvisionError> {
    let rows = settings
        .iter()
        .map(|(name, value)| {
            let name_literal = SqlLiteral::new("setting name", name)?;
            let value_literal = SqlLiteral::new(name, value)?;
            Ok(format!("({}, {})", name_literal, value_literal))
        })
        .collect::<Result<Vec<_>, ProvisionError>>()?;
    Ok(format!(
        "INSERT INTO `registry_settings` VALUES\n{};",
        rows.join(",\n")
    ))
}

/// Split on `;`, trim, and drop empty fragments.
///
/// Safe because no accepted [`SqlLiteral`] can contain a `;`.
pub fn split_statements(script: &str) -> Vec<&str> {
    script
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> HashedCredential {
        HashedCredential::from_encoded("$2a$10$abcdefghijklmnopqrstuu5Q9jZ0dG9H3o0S8oNq1vJgWkJj3CQ7e")
    }

    #[test]
    fn settings_insert_is_one_statement_in_order() {
        let mut settings = RegistrySettings::new();
        settings.insert("a", "1");
        settings.insert("b", "2");

        let script = BootstrapScript::build("root", &credential(), &settings).unwrap();
        let text = script.as_str();
        assert!(text.ends_with("INSERT INTO `registry_settings` VALUES\n('a', '1'),\n('b', '2');\n"));
        assert!(!text.contains("'2'),"));
        assert_eq!(text.matches("INSERT INTO `registry_settings`").count(), 1);
    }

    #[test]
    fn root_row_carries_hash_verbatim() {
        let hash = credential();
        let script = BootstrapScript::build("root", &hash, &RegistrySettings::new()).unwrap();
        let expected = format!(
            "INSERT INTO `registry_root_security` VALUES ('root', '0', '-1', '{}');",
            hash.as_str()
        );
        assert!(script.as_str().contains(&expected));
    }

    #[test]
    fn statements_cover_every_table() {
        let mut settings = RegistrySettings::new();
        settings.insert("a", "1");
        let script = BootstrapScript::build("root", &credential(), &settings).unwrap();
        let statements = script.statements();

        // 2 directives, drop + create per table, re-enable, 2 inserts.
        assert_eq!(statements.len(), 2 + TABLES.len() * 2 + 1 + 2);
        for table in TABLES {
            let drop = format!("DROP TABLE IF EXISTS `{}`", table);
            let create = format!("CREATE TABLE `{}` (", table);
            assert!(statements.contains(&drop.as_str()));
            assert!(statements.iter().any(|s| s.starts_with(&create)));
        }
        assert_eq!(statements[0], "SET NAMES utf8mb4");
        assert!(statements.iter().all(|s| !s.ends_with(';')));
    }

    #[test]
    fn empty_settings_omit_the_insert() {
        let script = BootstrapScript::build("root", &credential(), &RegistrySettings::new()).unwrap();
        assert!(!script.as_str().contains("registry_settings` VALUES"));
    }

    #[test]
    fn unsafe_values_are_rejected() {
        let mut settings = RegistrySettings::new();
        settings.insert("registry.name", "O'Brien Registry");
        let err = BootstrapScript::build("root", &credential(), &settings).unwrap_err();
        assert!(matches!(err, ProvisionError::UnsafeSqlLiteral { .. }));

        assert!(BootstrapScript::build("root'; DROP TABLE x", &credential(), &RegistrySettings::new()).is_err());
        assert!(SqlLiteral::new("f", "a;b").is_err());
        assert!(SqlLiteral::new("f", "a\\b").is_err());
        assert!(SqlLiteral::new("f", "a\nb").is_err());
    }

    #[test]
    fn accepted_literal_renders_unchanged() {
        let literal = SqlLiteral::new("registry.url", "https://fmrwiki.sdmxcloud.org/Main_Page").unwrap();
        assert_eq!(literal.to_string(), "'https://fmrwiki.sdmxcloud.org/Main_Page'");
        let templated = SqlLiteral::new("http.request.useragent", "FusionRegistry/${version}").unwrap();
        assert_eq!(templated.to_string(), "'FusionRegistry/${version}'");
    }
}
