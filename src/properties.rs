//! The runtime configuration artifact.
//!
//! The registry reads a Java-style properties file at start-up. Rendering is
//! a pure function of its inputs; writing is a separate step that owns all
//! the I/O. A small reader is kept alongside so an existing artifact can be
//! checked without re-provisioning.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::credential::HashedCredential;
use crate::error::ProvisionError;
use crate::keys::SecretMaterial;
use crate::settings::DatabaseCoordinates;

pub const DATABASE_DIALECT: &str = "org.hibernate.dialect.MySQL55Dialect";
pub const DATABASE_DRIVER: &str = "com.mysql.cj.jdbc.Driver";

/// Property keys, in the order they are written.
pub mod key {
    pub const DATABASE_DIALECT: &str = "database.dialect";
    pub const DATABASE_DRIVER: &str = "database.driver";
    pub const DATABASE_PASSWORD: &str = "database.password";
    pub const DATABASE_URL: &str = "database.url";
    pub const DATABASE_USE_CUSTOM_STRING: &str = "database.useCustomString";
    pub const DATABASE_USERNAME: &str = "database.username";
    pub const ENCRYPT_PASSWORD: &str = "encrypt.password";
    pub const ENCRYPT_SALT: &str = "encrypt.salt";
    pub const SECURITY_PASSWORD: &str = "security.password";
    pub const SECURITY_USERNAME: &str = "security.username";
}

/// `Thu Jan 01 00:00:00 UTC 1970`
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%a %b %d %H:%M:%S UTC %Y").to_string()
}

/// Inputs to the artifact. Borrowed so the same values that feed the
/// bootstrap script are the ones rendered here.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeProperties<'a> {
    pub database: &'a DatabaseCoordinates,
    pub encrypted_password: &'a str,
    pub material: &'a SecretMaterial,
    pub credential: &'a HashedCredential,
    pub admin_username: &'a str,
    pub generated_at: DateTime<Utc>,
}

impl RuntimeProperties<'_> {
    /// Key/value pairs in artifact order, unescaped.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (key::DATABASE_DIALECT, DATABASE_DIALECT.to_string()),
            (key::DATABASE_DRIVER, DATABASE_DRIVER.to_string()),
            (key::DATABASE_PASSWORD, self.encrypted_password.to_string()),
            (key::DATABASE_URL, self.database.jdbc_url()),
            (key::DATABASE_USE_CUSTOM_STRING, "false".to_string()),
            (key::DATABASE_USERNAME, self.database.username.clone()),
            (key::ENCRYPT_PASSWORD, self.material.encrypt_password().to_string()),
            (key::ENCRYPT_SALT, self.material.encrypt_salt().to_string()),
            (key::SECURITY_PASSWORD, self.credential.as_str().to_string()),
            (key::SECURITY_USERNAME, self.admin_username.to_string()),
        ]
    }

    /// Render the full document. Identical inputs give identical bytes.
    pub fn render(&self) -> String {
        let timestamp = format_timestamp(&self.generated_at);
        let mut out = format!("#Modified on {}\n#{}\n", timestamp, timestamp);
        for (name, value) in self.entries() {
            out.push_str(name);
            out.push('=');
            out.push_str(&escape_value(&value));
            out.push('\n');
        }
        out
    }
}

/// Backslash-escape the characters a properties reader would otherwise
/// interpret.
///
/// A leading space is written as `\ `: readers skip whitespace after the
/// separator, so an unescaped one would be lost.
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            ' ' if i == 0 => escaped.push_str("\\ "),
            '\\' => escaped.push_str("\\\\"),
            ':' => escaped.push_str("\\:"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\u{c}' => escaped.push_str("\\f"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('f') => out.push('\u{c}'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Write the rendered document to `path`.
///
/// Parent directories are created if absent. The file handle is scoped to
/// this function and released on every exit path.
pub fn write_properties(path: &Path, contents: &str) -> Result<(), ProvisionError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ProvisionError::Io {
            operation: "create directory",
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let io_err = |operation: &'static str| {
        move |source| ProvisionError::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    };

    let mut file = File::create(path).map_err(io_err("create"))?;
    file.write_all(contents.as_bytes()).map_err(io_err("write"))?;
    file.sync_all().map_err(io_err("sync"))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// A parsed properties document. Comments and blank lines are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertiesFile {
    entries: Vec<(String, String)>,
}

impl PropertiesFile {
    /// Parse `key=value` lines.
    ///
    /// The key ends at the first unescaped `=`, `:` or whitespace. Whitespace
    /// around that separator is skipped, so the value starts at its first
    /// non-blank character unless that blank was escaped.
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .map(|line| line.trim_start_matches(is_blank))
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
            .map(split_entry)
            .collect();
        Self { entries }
    }

    pub fn read(path: &Path) -> Result<Self, ProvisionError> {
        let text = fs::read_to_string(path).map_err(|source| ProvisionError::Io {
            operation: "read",
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// Like [`get`](Self::get) but a missing key is an error.
    pub fn require(&self, name: &str) -> Result<&str, ProvisionError> {
        self.get(name)
            .ok_or_else(|| ProvisionError::ArtifactMismatch(format!("missing property {}", name)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\u{c}')
}

fn split_entry(line: &str) -> (String, String) {
    let Some((at, separator)) = key_end(line) else {
        return (unescape_value(line), String::new());
    };

    let mut rest = line[at + separator.len_utf8()..].trim_start_matches(is_blank);
    if is_blank(separator) {
        if let Some(stripped) = rest.strip_prefix(|c: char| c == '=' || c == ':') {
            rest = stripped.trim_start_matches(is_blank);
        }
    }
    (unescape_value(&line[..at]), unescape_value(rest))
}

fn key_end(line: &str) -> Option<(usize, char)> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '=' | ':' => return Some((i, c)),
            c if is_blank(c) => return Some((i, c)),
            _ => {}
        }
    }
    None
}
