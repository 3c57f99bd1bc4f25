//! Package and project manifests.
//!
//! A package directory describes itself with `manifest.chai.json` or, failing
//! that, a foreign `package.json`. The same two files, found in the invoking
//! project, receive the dependencies an install records.

use super::error::PkgError;
use super::registry::RegistryKind;
use chai_util::fs::atomic_write;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Native manifest file name.
pub const CHAI_MANIFEST: &str = "manifest.chai.json";

/// Foreign (npm-style) manifest file name.
pub const PACKAGE_JSON: &str = "package.json";

/// Which file a manifest was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestSource {
    Chai,
    PackageJson,
}

impl ManifestSource {
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Chai => CHAI_MANIFEST,
            Self::PackageJson => PACKAGE_JSON,
        }
    }
}

/// The `bin` field: a single path bound to the package name, or a name map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BinField {
    Single(String),
    Map(BTreeMap<String, String>),
}

/// A package's own manifest, read leniently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageManifest {
    pub source: ManifestSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// `type` field; for chai manifests the package kind, for package.json the module type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub dependencies: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin: Option<BinField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postinstall: Option<String>,
}

impl PackageManifest {
    /// Build a manifest from parsed JSON, ignoring fields with unexpected shapes.
    #[must_use]
    pub fn from_value(value: &Value, source: ManifestSource) -> Self {
        let string = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        let postinstall = match source {
            ManifestSource::Chai => string("postinstall").or_else(|| script(value, "postinstall")),
            ManifestSource::PackageJson => script(value, "postinstall"),
        };

        Self {
            source,
            name: string("name"),
            version: string("version"),
            package_type: string("type"),
            description: string("description"),
            dependencies: string_map(value.get("dependencies")),
            bin: bin_field(value.get("bin")),
            postinstall,
        }
    }

    /// Read the manifest of a package directory, if it has one.
    ///
    /// # Errors
    /// Returns `PKG_MANIFEST_INVALID` if the file exists but is not a JSON object.
    pub fn read_dir(dir: &Path) -> Result<Option<Self>, PkgError> {
        for source in [ManifestSource::Chai, ManifestSource::PackageJson] {
            let path = dir.join(source.file_name());
            if let Some(value) = read_json_object(&path)? {
                return Ok(Some(Self::from_value(&value, source)));
            }
        }
        Ok(None)
    }

    /// Executables declared by this manifest.
    ///
    /// The single-string form binds the package's own name (unscoped).
    #[must_use]
    pub fn bin_map(&self) -> BinMap {
        match &self.bin {
            Some(BinField::Map(map)) => map.clone(),
            Some(BinField::Single(path)) => self
                .name
                .as_deref()
                .map(|name| {
                    let bin_name = name.rsplit('/').next().unwrap_or(name);
                    BTreeMap::from([(bin_name.to_string(), path.clone())])
                })
                .unwrap_or_default(),
            None => BinMap::new(),
        }
    }
}

/// Executable name -> path relative to the package directory.
pub type BinMap = BTreeMap<String, String>;

/// Load the manifest of a local package directory.
///
/// # Errors
/// Returns `PKG_MISSING_MANIFEST` if neither manifest file exists.
pub fn load_manifest(dir: &Path) -> Result<PackageManifest, PkgError> {
    PackageManifest::read_dir(dir)?.ok_or_else(|| PkgError::missing_manifest(dir))
}

/// The invoking project's manifest, updated after installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectManifest {
    path: PathBuf,
    source: ManifestSource,
}

impl ProjectManifest {
    /// Find `manifest.chai.json`, else `package.json`, in `dir`.
    #[must_use]
    pub fn locate(dir: &Path) -> Option<Self> {
        [ManifestSource::Chai, ManifestSource::PackageJson]
            .into_iter()
            .map(|source| Self {
                path: dir.join(source.file_name()),
                source,
            })
            .find(|m| m.path.is_file())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn source(&self) -> ManifestSource {
        self.source
    }

    /// Directory holding the manifest (and the lockfile).
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    /// Set `dependencies[key] = spec`, preserving every other field.
    ///
    /// The document is re-read immediately before writing and replaced
    /// atomically; concurrent writers resolve as last-writer-wins.
    ///
    /// # Errors
    /// Returns `PKG_MANIFEST_INVALID` if the document is not a JSON object.
    pub fn record_dependency(&self, key: &str, spec: &str) -> Result<(), PkgError> {
        let mut doc = read_json_object(&self.path)?.unwrap_or_else(|| Value::Object(Map::new()));
        let Some(root) = doc.as_object_mut() else {
            return Err(PkgError::manifest_invalid(format!(
                "{} is not a JSON object",
                self.path.display()
            )));
        };

        let deps = root
            .entry("dependencies")
            .or_insert_with(|| Value::Object(Map::new()));
        if !deps.is_object() {
            return Err(PkgError::manifest_invalid(format!(
                "'dependencies' in {} is not an object",
                self.path.display()
            )));
        }
        if let Some(deps) = deps.as_object_mut() {
            deps.insert(key.to_string(), Value::String(spec.to_string()));
        }

        let mut out = serde_json::to_string_pretty(&doc)
            .map_err(|e| PkgError::manifest_invalid(e.to_string()))?;
        out.push('\n');
        atomic_write(&self.path, out.as_bytes())?;

        tracing::debug!(manifest = %self.path.display(), key, spec, "recorded dependency");
        Ok(())
    }

    /// Dependencies currently declared by the project.
    ///
    /// # Errors
    /// Returns `PKG_MANIFEST_INVALID` if the document cannot be parsed.
    pub fn dependencies(&self) -> Result<BTreeMap<String, String>, PkgError> {
        Ok(read_json_object(&self.path)?
            .map(|doc| string_map(doc.get("dependencies")))
            .unwrap_or_default())
    }
}

/// Key a dependency is recorded under: bare name for npm, `<prefix>:<name>` otherwise.
#[must_use]
pub fn dependency_key(kind: RegistryKind, name: &str) -> String {
    match kind {
        RegistryKind::Npm => name.to_string(),
        other => format!("{}:{name}", other.prefix()),
    }
}

/// Read a JSON object; a missing file is `None`.
fn read_json_object(path: &Path) -> Result<Option<Value>, PkgError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PkgError::manifest_invalid(format!(
                "Failed to read {}: {e}",
                path.display()
            )))
        }
    };

    let value: Value = serde_json::from_str(&content).map_err(|e| {
        PkgError::manifest_invalid(format!("Failed to parse {}: {e}", path.display()))
    })?;
    if !value.is_object() {
        return Err(PkgError::manifest_invalid(format!(
            "{} is not a JSON object",
            path.display()
        )));
    }
    Ok(Some(value))
}

fn script(value: &Value, name: &str) -> Option<String> {
    value
        .get("scripts")?
        .get(name)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn bin_field(value: Option<&Value>) -> Option<BinField> {
    match value? {
        Value::String(path) if !path.is_empty() => Some(BinField::Single(path.clone())),
        Value::Object(_) => {
            let map = string_map(value);
            (!map.is_empty()).then_some(BinField::Map(map))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_chai_manifest_preferred() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CHAI_MANIFEST),
            r#"{"name": "tool", "version": "0.1.0", "type": "cli", "postinstall": "make"}"#,
        )
        .unwrap();
        fs::write(dir.path().join(PACKAGE_JSON), r#"{"name": "other"}"#).unwrap();

        let manifest = load_manifest(dir.path()).unwrap();
        assert_eq!(manifest.source, ManifestSource::Chai);
        assert_eq!(manifest.name.as_deref(), Some("tool"));
        assert_eq!(manifest.package_type.as_deref(), Some("cli"));
        assert_eq!(manifest.postinstall.as_deref(), Some("make"));
    }

    #[test]
    fn test_package_json_fallback() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(PACKAGE_JSON),
            r#"{
                "name": "@scope/cli",
                "version": "1.0.0",
                "dependencies": {"chalk": "^5.0.0", "weird": 3},
                "bin": "./bin/cli.js",
                "scripts": {"postinstall": "node setup.js"}
            }"#,
        )
        .unwrap();

        let manifest = load_manifest(dir.path()).unwrap();
        assert_eq!(manifest.source, ManifestSource::PackageJson);
        assert_eq!(manifest.dependencies.len(), 1);
        assert_eq!(manifest.dependencies["chalk"], "^5.0.0");
        assert_eq!(manifest.postinstall.as_deref(), Some("node setup.js"));
        assert_eq!(
            manifest.bin_map(),
            BTreeMap::from([("cli".to_string(), "./bin/cli.js".to_string())])
        );
    }

    #[test]
    fn test_bin_object_form() {
        let manifest = PackageManifest::from_value(
            &json!({"name": "multi", "bin": {"a": "bin/a.js", "b": "bin/b.js"}}),
            ManifestSource::PackageJson,
        );
        let bins = manifest.bin_map();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins["b"], "bin/b.js");
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempdir().unwrap();
        let err = load_manifest(dir.path()).unwrap_err();
        assert_eq!(err.code(), crate::pkg::error::codes::PKG_MISSING_MANIFEST);
    }

    #[test]
    fn test_invalid_manifest() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PACKAGE_JSON), "[1, 2]").unwrap();
        let err = load_manifest(dir.path()).unwrap_err();
        assert_eq!(err.code(), crate::pkg::error::codes::PKG_MANIFEST_INVALID);
    }

    #[test]
    fn test_record_dependency_preserves_fields() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CHAI_MANIFEST),
            r#"{"name": "app", "version": "1.0.0", "custom": {"keep": true}}"#,
        )
        .unwrap();

        let project = ProjectManifest::locate(dir.path()).unwrap();
        assert_eq!(project.source(), ManifestSource::Chai);
        project.record_dependency("chalk", "5.3.0").unwrap();
        project.record_dependency("py:requests", "2.31.0").unwrap();
        project.record_dependency("chalk", "5.4.0").unwrap();

        let doc: Value =
            serde_json::from_str(&fs::read_to_string(project.path()).unwrap()).unwrap();
        assert_eq!(doc["name"], "app");
        assert_eq!(doc["custom"]["keep"], true);
        assert_eq!(doc["dependencies"]["chalk"], "5.4.0");
        assert_eq!(doc["dependencies"]["py:requests"], "2.31.0");
        assert_eq!(project.dependencies().unwrap().len(), 2);
    }

    #[test]
    fn test_record_dependency_rejects_non_object_dependencies() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PACKAGE_JSON), r#"{"dependencies": []}"#).unwrap();
        let project = ProjectManifest::locate(dir.path()).unwrap();
        let err = project.record_dependency("chalk", "1.0.0").unwrap_err();
        assert_eq!(err.code(), crate::pkg::error::codes::PKG_MANIFEST_INVALID);
    }

    #[test]
    fn test_locate_none() {
        let dir = tempdir().unwrap();
        assert!(ProjectManifest::locate(dir.path()).is_none());
    }

    #[test]
    fn test_dependency_key() {
        assert_eq!(dependency_key(RegistryKind::Npm, "@scope/pkg"), "@scope/pkg");
        assert_eq!(dependency_key(RegistryKind::Python, "requests"), "py:requests");
        assert_eq!(dependency_key(RegistryKind::Github, "user/repo"), "gh:user/repo");
        assert_eq!(dependency_key(RegistryKind::System, "curl"), "sys:curl");
    }
}
