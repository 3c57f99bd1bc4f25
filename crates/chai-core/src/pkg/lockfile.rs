//! `chai.lock`: exact versions and digests for every package an install touched.
//!
//! ## Schema Version
//!
//! - Schema version 1: initial format
//!
//! ## File Format
//!
//! The lockfile lives next to the project manifest:
//!
//! ```json
//! {
//!   "lockfile_version": 1,
//!   "meta": { "generated_at": "2024-01-15T12:30:00+00:00", "chai_version": "0.1.0" },
//!   "dependencies": { "chalk": "npm:chalk@5.3.0" },
//!   "packages": {
//!     "npm:chalk@5.3.0": {
//!       "kind": "npm",
//!       "name": "chalk",
//!       "version": "5.3.0",
//!       "resolved": "https://registry.npmjs.org/chalk/-/chalk-5.3.0.tgz",
//!       "integrity": "sha512-..."
//!     }
//!   }
//! }
//! ```
//!
//! Installs merge into an existing lockfile rather than replacing it.

use super::error::PkgError;
use super::registry::RegistryKind;
use chai_util::fs::atomic_write;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Schema version for the lockfile format.
///
/// Changes to this version indicate breaking changes to the format.
pub const PKG_LOCK_SCHEMA_VERSION: u32 = 1;

/// Lockfile filename.
pub const LOCKFILE_NAME: &str = "chai.lock";

/// Metadata about the lockfile itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LockMeta {
    /// When the lockfile was last written (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    /// Version of chai that wrote this lockfile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chai_version: Option<String>,
}

impl LockMeta {
    fn is_empty(&self) -> bool {
        self.generated_at.is_none() && self.chai_version.is_none()
    }
}

/// One locked package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPackage {
    pub kind: RegistryKind,
    pub name: String,
    pub version: String,
    /// Artifact URL the package was downloaded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    /// SRI digest of the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    /// Package keys of the direct dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl LockPackage {
    #[must_use]
    pub fn new(kind: RegistryKind, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            version: version.into(),
            resolved: None,
            integrity: None,
            dependencies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_resolved(mut self, url: impl Into<String>) -> Self {
        self.resolved = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_integrity(mut self, integrity: impl Into<String>) -> Self {
        self.integrity = Some(integrity.into());
        self
    }

    /// Key this package is stored under.
    #[must_use]
    pub fn key(&self) -> String {
        Lockfile::package_key(self.kind, &self.name, &self.version)
    }
}

/// The lockfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub lockfile_version: u32,
    #[serde(default, skip_serializing_if = "LockMeta::is_empty")]
    pub meta: LockMeta,
    /// Project dependency key -> locked package key.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Package key -> package. BTreeMap keeps the output deterministic.
    #[serde(default)]
    pub packages: BTreeMap<String, LockPackage>,
}

impl Default for Lockfile {
    fn default() -> Self {
        Self {
            lockfile_version: PKG_LOCK_SCHEMA_VERSION,
            meta: LockMeta::default(),
            dependencies: BTreeMap::new(),
            packages: BTreeMap::new(),
        }
    }
}

impl Lockfile {
    /// Path of the lockfile that belongs to a project directory.
    #[must_use]
    pub fn path_in(project_dir: &Path) -> PathBuf {
        project_dir.join(LOCKFILE_NAME)
    }

    /// `<kind>:<name>@<version>`.
    #[must_use]
    pub fn package_key(kind: RegistryKind, name: &str, version: &str) -> String {
        format!("{kind}:{name}@{version}")
    }

    /// Insert or replace a package.
    pub fn add_package(&mut self, pkg: LockPackage) {
        self.packages.insert(pkg.key(), pkg);
    }

    /// Record a top-level project dependency.
    pub fn add_dependency(&mut self, key: impl Into<String>, package_key: impl Into<String>) {
        self.dependencies.insert(key.into(), package_key.into());
    }

    #[must_use]
    pub fn get_package(&self, kind: RegistryKind, name: &str, version: &str) -> Option<&LockPackage> {
        self.packages.get(&Self::package_key(kind, name, version))
    }

    /// Stamp the write time and writer version.
    pub fn touch(&mut self) {
        self.meta.generated_at = Some(chrono::Utc::now().to_rfc3339());
        self.meta.chai_version = Some(crate::version::VERSION.to_string());
    }

    /// Read a lockfile; a missing file is `None`.
    ///
    /// # Errors
    /// Returns `PKG_LOCKFILE_ERROR` if the file cannot be read, is not valid
    /// JSON, or has an unsupported schema version.
    pub fn read_from(path: &Path) -> Result<Option<Self>, PkgError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PkgError::lockfile(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        let lockfile = Self::from_json(&content)?;
        if lockfile.lockfile_version != PKG_LOCK_SCHEMA_VERSION {
            return Err(PkgError::lockfile(format!(
                "Lockfile version {} not supported (expected {})",
                lockfile.lockfile_version, PKG_LOCK_SCHEMA_VERSION
            )));
        }
        Ok(Some(lockfile))
    }

    /// Write the lockfile atomically.
    ///
    /// # Errors
    /// Returns `PKG_LOCKFILE_ERROR` if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), PkgError> {
        let mut content = self.to_json()?;
        content.push('\n');
        atomic_write(path, content.as_bytes())
            .map_err(|e| PkgError::lockfile(format!("Failed to write {}: {e}", path.display())))
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    /// Returns `PKG_LOCKFILE_ERROR` if serialization fails.
    pub fn to_json(&self) -> Result<String, PkgError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PkgError::lockfile(format!("Failed to serialize lockfile: {e}")))
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    /// Returns `PKG_LOCKFILE_ERROR` if the JSON is invalid.
    pub fn from_json(json: &str) -> Result<Self, PkgError> {
        serde_json::from_str(json)
            .map_err(|e| PkgError::lockfile(format!("Invalid lockfile JSON: {e}")))
    }

    /// Merge `packages` and `dependencies` into the lockfile at `path` and write it back.
    ///
    /// # Errors
    /// Returns `PKG_LOCKFILE_ERROR` if the existing file is unreadable or the write fails.
    pub fn update(
        path: &Path,
        packages: impl IntoIterator<Item = LockPackage>,
        dependencies: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, PkgError> {
        let mut lockfile = Self::read_from(path)?.unwrap_or_default();
        for pkg in packages {
            lockfile.add_package(pkg);
        }
        for (key, package_key) in dependencies {
            lockfile.add_dependency(key, package_key);
        }
        lockfile.touch();
        lockfile.write_to(path)?;
        tracing::debug!(lockfile = %path.display(), packages = lockfile.packages.len(), "wrote lockfile");
        Ok(lockfile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;
    use tempfile::tempdir;

    #[test]
    fn test_lockfile_schema_version_is_stable() {
        assert_eq!(PKG_LOCK_SCHEMA_VERSION, 1);
        assert_eq!(Lockfile::default().lockfile_version, 1);
    }

    #[test]
    fn test_package_key() {
        assert_eq!(
            Lockfile::package_key(RegistryKind::Npm, "@types/node", "20.0.0"),
            "npm:@types/node@20.0.0"
        );
        assert_eq!(
            Lockfile::package_key(RegistryKind::Github, "user/repo", "latest"),
            "github:user/repo@latest"
        );
    }

    #[test]
    fn test_json_roundtrip_and_ordering() {
        let mut lockfile = Lockfile::default();
        lockfile.add_package(LockPackage::new(RegistryKind::Npm, "zod", "3.0.0"));
        lockfile.add_package(
            LockPackage::new(RegistryKind::Npm, "axios", "1.0.0")
                .with_resolved("https://r/axios-1.0.0.tgz")
                .with_integrity("sha512-a"),
        );
        lockfile.add_dependency("axios", "npm:axios@1.0.0");

        let json = lockfile.to_json().unwrap();
        assert!(json.find("npm:axios@").unwrap() < json.find("npm:zod@").unwrap());
        // Empty optional fields are omitted.
        assert!(!json.contains("\"meta\""));

        let parsed = Lockfile::from_json(&json).unwrap();
        assert_eq!(parsed, lockfile);
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempdir().unwrap();
        assert!(Lockfile::read_from(&dir.path().join(LOCKFILE_NAME))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_read_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOCKFILE_NAME);
        fs::write(&path, "{ nope").unwrap();
        let err = Lockfile::read_from(&path).unwrap_err();
        assert_eq!(err.code(), codes::PKG_LOCKFILE_ERROR);
    }

    #[test]
    fn test_read_version_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOCKFILE_NAME);
        fs::write(&path, r#"{"lockfile_version": 99}"#).unwrap();
        let err = Lockfile::read_from(&path).unwrap_err();
        assert!(err.message().contains("99"));
    }

    #[test]
    fn test_update_merges_and_stamps() {
        let dir = tempdir().unwrap();
        let path = Lockfile::path_in(dir.path());

        Lockfile::update(
            &path,
            [LockPackage::new(RegistryKind::Npm, "a", "1.0.0")],
            [("a".to_string(), "npm:a@1.0.0".to_string())],
        )
        .unwrap();
        let second = Lockfile::update(
            &path,
            [LockPackage::new(RegistryKind::Python, "b", "2.0.0")],
            [("py:b".to_string(), "python:b@2.0.0".to_string())],
        )
        .unwrap();

        assert_eq!(second.packages.len(), 2);
        assert_eq!(second.dependencies.len(), 2);
        assert!(second.get_package(RegistryKind::Npm, "a", "1.0.0").is_some());
        assert!(second.meta.generated_at.is_some());
        assert_eq!(second.meta.chai_version.as_deref(), Some(crate::version::VERSION));

        let on_disk = Lockfile::read_from(&path).unwrap().unwrap();
        assert_eq!(on_disk, second);
    }
}
