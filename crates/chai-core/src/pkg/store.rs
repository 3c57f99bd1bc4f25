//! Package store and artifact cache layout.
//!
//! - `packages/<kind>/<name>/<version>/` holds extracted packages
//! - `cache/<kind>/<name>-<version>.<ext>` holds downloaded artifacts
//! - `tmp/<kind>/<name>/<version>/` receives non-persistent installs
//!
//! Scoped npm names (`@scope/pkg`) and GitHub names (`owner/repo`) occupy two
//! directory levels below `<kind>`.

use super::registry::RegistryKind;
use crate::paths::Sandbox;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One extracted package found in the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct InstalledPackage {
    pub kind: RegistryKind,
    pub name: String,
    pub version: String,
    pub path: PathBuf,
}

impl Sandbox {
    /// Store directory for one package version.
    #[must_use]
    pub fn package_dir(&self, kind: RegistryKind, name: &str, version: &str) -> PathBuf {
        package_path(&self.packages_dir(), kind, name, version)
    }

    /// Scratch directory for an install that is not persisted.
    #[must_use]
    pub fn tmp_package_dir(&self, kind: RegistryKind, name: &str, version: &str) -> PathBuf {
        package_path(&self.tmp_dir(), kind, name, version)
    }

    /// Cache file for a downloaded artifact.
    #[must_use]
    pub fn artifact_path(
        &self,
        kind: RegistryKind,
        name: &str,
        version: &str,
        extension: &str,
    ) -> PathBuf {
        let file = format!(
            "{}-{}.{}",
            name.split('/')
                .map(sanitize_component)
                .collect::<Vec<_>>()
                .join("-"),
            sanitize_component(version),
            extension
        );
        self.cache_dir().join(kind.as_str()).join(file)
    }

    /// Whether a package version has been extracted into the store.
    #[must_use]
    pub fn has_package(&self, kind: RegistryKind, name: &str, version: &str) -> bool {
        self.package_dir(kind, name, version).is_dir()
    }

    /// Every package version in the store, sorted by kind, name and version.
    ///
    /// # Errors
    /// Returns an error if a store directory exists but cannot be read.
    pub fn list_installed(&self) -> io::Result<Vec<InstalledPackage>> {
        let mut installed = Vec::new();

        for kind in RegistryKind::ALL {
            let kind_dir = self.packages_dir().join(kind.as_str());
            for (name, name_dir) in name_dirs(&kind_dir, kind)? {
                for version in subdirs(&name_dir)? {
                    installed.push(InstalledPackage {
                        kind,
                        path: name_dir.join(&version),
                        name: name.clone(),
                        version,
                    });
                }
            }
        }

        installed.sort();
        Ok(installed)
    }
}

fn package_path(root: &Path, kind: RegistryKind, name: &str, version: &str) -> PathBuf {
    let mut path = root.join(kind.as_str());
    for part in name.split('/') {
        path.push(sanitize_component(part));
    }
    path.push(sanitize_component(version));
    path
}

/// Make a name or version safe to use as a single path component.
#[must_use]
pub fn sanitize_component(part: &str) -> String {
    let cleaned: String = part
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".repeat(cleaned.len().max(1)),
        _ => cleaned,
    }
}

/// `(name, dir)` for every package name under a kind directory.
fn name_dirs(kind_dir: &Path, kind: RegistryKind) -> io::Result<Vec<(String, PathBuf)>> {
    let mut names = Vec::new();

    for first in subdirs(kind_dir)? {
        let first_dir = kind_dir.join(&first);
        if kind == RegistryKind::Github || first.starts_with('@') {
            for second in subdirs(&first_dir)? {
                names.push((format!("{first}/{second}"), first_dir.join(&second)));
            }
        } else {
            names.push((first, first_dir));
        }
    }

    Ok(names)
}

/// Names of visible subdirectories; a missing directory has none.
fn subdirs(dir: &Path) -> io::Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        // Staging directories and other dot-entries are not packages.
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
