//! Registry adapters.
//!
//! The adapter set is closed: [`Registry`] is an enum over the five sources and
//! [`Registries`] is the lookup table that maps an identifier prefix onto one of
//! them. Every adapter answers the same questions (resolve a name, fetch
//! metadata, list versions, describe a downloadable artifact) so callers never
//! branch on the source except when selecting the adapter.

mod chai;
mod github;
mod npm;
mod python;
mod system;

pub use chai::ChaiRegistry;
pub use github::GithubRegistry;
pub use npm::NpmRegistry;
pub use python::PythonRegistry;
pub use system::SystemRegistry;

use super::error::PkgError;
use super::fetch::{fetch_and_verify, Fetched};
use super::ident::{scope_of, split_prefix, split_range};
use crate::config::Endpoints;
use crate::paths::Sandbox;
use crate::version::USER_AGENT;
use chai_util::hash::{digests_file, Integrity};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Which source a package comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    Npm,
    Python,
    Github,
    System,
    Chai,
}

impl RegistryKind {
    pub const ALL: [Self; 5] = [
        Self::Npm,
        Self::Python,
        Self::Github,
        Self::System,
        Self::Chai,
    ];

    /// Stable name used in store paths and the lockfile.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Python => "python",
            Self::Github => "github",
            Self::System => "system",
            Self::Chai => "chai",
        }
    }

    /// Short identifier prefix written back into project manifests.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Python => "py",
            Self::Github => "gh",
            Self::System => "sys",
            Self::Chai => "chai",
        }
    }

    /// Every prefix spelling this source answers to.
    #[must_use]
    pub fn prefixes(self) -> &'static [&'static str] {
        match self {
            Self::Npm => &["npm"],
            Self::Python => &["py", "python"],
            Self::Github => &["gh", "github"],
            Self::System => &["sys", "system"],
            Self::Chai => &["chai"],
        }
    }

    /// Map a prefix (any case) onto a source.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        let prefix = prefix.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.prefixes().contains(&prefix.as_str()))
    }

    /// Source named by the identifier's prefix, if it has a recognised one.
    #[must_use]
    pub fn of_identifier(identifier: &str) -> Option<Self> {
        split_prefix(identifier.trim()).0.and_then(Self::from_prefix)
    }

    /// Strip this source's own prefix forms from an identifier.
    #[must_use]
    pub fn strip_own_prefix(self, identifier: &str) -> &str {
        let identifier = identifier.trim();
        match split_prefix(identifier) {
            (Some(prefix), rest) if Self::from_prefix(prefix) == Some(self) => rest,
            _ => identifier,
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistryKind {
    type Err = PkgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_prefix(s)
            .ok_or_else(|| PkgError::invalid_identifier(format!("Unknown package source '{s}'")))
    }
}

/// Name (and optional range) an adapter extracted from an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub name: String,
    /// Scope without `@`, for scoped npm names.
    pub scope: Option<String>,
    pub range: Option<String>,
}

impl ResolvedName {
    /// Split `name@range` after the adapter stripped its prefix.
    ///
    /// # Errors
    /// Returns `PKG_INVALID_IDENTIFIER` if the name is empty.
    pub fn split(identifier: &str, rest: &str) -> Result<Self, PkgError> {
        let (name, range) = split_range(rest);
        let name = name.trim();
        if name.is_empty() {
            return Err(PkgError::invalid_identifier(format!(
                "Invalid identifier '{identifier}': empty package name"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            scope: scope_of(name).map(String::from),
            range: range
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from),
        })
    }
}

/// Resolved description of one concrete package version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    /// `None` until a concrete version has been chosen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dist: Option<Dist>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

/// Where the artifact lives and what it should hash to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dist {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tarball: Option<String>,
    /// Digest as published by the source (hex or legacy SHA-1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
    /// SRI digest, when the source publishes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

/// `repository` as found in the wild: a bare URL or `{type, url}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Repository {
    Url(String),
    Detailed {
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

impl Repository {
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            Self::Detailed { url, .. } => url.as_deref(),
        }
    }
}

/// A downloadable artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub url: String,
    /// Expected digest; `None` when the source publishes nothing verifiable.
    pub integrity: Option<Integrity>,
    /// Cache file extension, without the leading dot.
    pub extension: String,
}

/// One registry adapter.
#[derive(Debug, Clone)]
pub enum Registry {
    Npm(NpmRegistry),
    Python(PythonRegistry),
    Github(GithubRegistry),
    System(SystemRegistry),
    Chai(ChaiRegistry),
}

impl Registry {
    #[must_use]
    pub fn kind(&self) -> RegistryKind {
        match self {
            Self::Npm(_) => RegistryKind::Npm,
            Self::Python(_) => RegistryKind::Python,
            Self::Github(_) => RegistryKind::Github,
            Self::System(_) => RegistryKind::System,
            Self::Chai(_) => RegistryKind::Chai,
        }
    }

    /// Interpret an identifier, stripping this adapter's own prefix forms.
    ///
    /// # Errors
    /// Returns `PKG_INVALID_IDENTIFIER` if no usable name remains.
    pub fn resolve_identifier(&self, identifier: &str) -> Result<ResolvedName, PkgError> {
        let rest = self.kind().strip_own_prefix(identifier);
        let resolved = ResolvedName::split(identifier, rest)?;
        if let Self::Github(_) = self {
            github::validate_repo_name(identifier, &resolved.name)?;
        }
        Ok(resolved)
    }

    /// Metadata for the version of `name` selected by `range`.
    ///
    /// # Errors
    /// Returns `PKG_METADATA_FETCH_FAILED` on transport failures and
    /// `PKG_NO_VERSION_SATISFIES_RANGE` if the range matches nothing.
    pub async fn get_metadata(
        &self,
        name: &str,
        range: Option<&str>,
    ) -> Result<PackageMetadata, PkgError> {
        match self {
            Self::Npm(r) => r.get_metadata(name, range).await,
            Self::Python(r) => r.get_metadata(name, range).await,
            Self::Github(r) => r.get_metadata(name, range).await,
            Self::System(r) => Ok(r.get_metadata(name)),
            Self::Chai(r) => Ok(r.get_metadata(name)),
        }
    }

    /// All published versions, or `None` for sources without a version listing.
    ///
    /// # Errors
    /// Returns `PKG_METADATA_FETCH_FAILED` on transport failures.
    pub async fn list_versions(&self, name: &str) -> Result<Option<Vec<String>>, PkgError> {
        match self {
            Self::Npm(r) => r.list_versions(name).await.map(Some),
            Self::Python(r) => r.list_versions(name).await.map(Some),
            Self::Github(r) => r.list_versions(name).await.map(Some),
            Self::System(_) | Self::Chai(_) => Ok(None),
        }
    }

    /// Download descriptor for resolved metadata; `None` if the source is not downloadable.
    ///
    /// # Errors
    /// Returns `PKG_DOWNLOAD_FAILED` if downloadable metadata lacks an artifact URL.
    pub fn artifact(&self, meta: &PackageMetadata) -> Result<Option<Artifact>, PkgError> {
        match self {
            Self::Npm(_) => npm::artifact(meta).map(Some),
            Self::Python(_) => python::artifact(meta).map(Some),
            Self::Github(_) => github::artifact(meta).map(Some),
            Self::System(_) | Self::Chai(_) => Ok(None),
        }
    }

    /// Fetch the artifact for `meta` into the sandbox cache.
    ///
    /// A cached file whose digest already matches is reused without touching
    /// the network. Returns `None` for sources that are not downloadable.
    ///
    /// # Errors
    /// Returns `PKG_DOWNLOAD_FAILED` or `PKG_INTEGRITY_MISMATCH`.
    pub async fn download(
        &self,
        client: &Client,
        sandbox: &Sandbox,
        meta: &PackageMetadata,
    ) -> Result<Option<Fetched>, PkgError> {
        let Some(artifact) = self.artifact(meta)? else {
            return Ok(None);
        };
        let version = meta.version.as_deref().unwrap_or("latest");
        let dest = sandbox.artifact_path(self.kind(), &meta.name, version, &artifact.extension);

        if let Some(cached) = reuse_cached(&dest, artifact.integrity.as_ref()).await {
            tracing::debug!(path = %dest.display(), "reusing cached artifact");
            return Ok(Some(cached));
        }

        fetch_and_verify(client, &artifact.url, &dest, artifact.integrity.as_ref())
            .await
            .map(Some)
    }
}

/// A cache hit counts only when the expected digest is known and matches.
async fn reuse_cached(path: &Path, expected: Option<&Integrity>) -> Option<Fetched> {
    let expected = expected?.clone();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || cached_artifact(path, &expected))
        .await
        .ok()
        .flatten()
}

fn cached_artifact(path: PathBuf, expected: &Integrity) -> Option<Fetched> {
    let size = std::fs::metadata(&path).ok()?.len();
    let digests = digests_file(&path, Some(expected.algorithm())).ok()?;
    if digests.get(expected.algorithm()) != Some(expected) {
        return None;
    }
    Some(Fetched {
        path,
        integrity: digests.sha512,
        size,
    })
}

/// The adapter lookup table, built once per process.
#[derive(Debug, Clone)]
pub struct Registries {
    client: Client,
    npm: Registry,
    python: Registry,
    github: Registry,
    system: Registry,
    chai: Registry,
}

impl Registries {
    /// Build every adapter from the configured endpoints, sharing one HTTP client.
    ///
    /// # Errors
    /// Returns an error if an endpoint URL is invalid or the HTTP client cannot be created.
    pub fn new(endpoints: &Endpoints) -> Result<Self, PkgError> {
        let client = http_client()?;
        Ok(Self {
            npm: Registry::Npm(NpmRegistry::new(
                client.clone(),
                base_url(&endpoints.npm_registry)?,
            )),
            python: Registry::Python(PythonRegistry::new(
                client.clone(),
                base_url(&endpoints.pypi)?,
            )),
            github: Registry::Github(GithubRegistry::new(
                client.clone(),
                base_url(&endpoints.github_api)?,
                base_url(&endpoints.github_web)?,
                endpoints.github_token.clone(),
            )),
            system: Registry::System(SystemRegistry),
            chai: Registry::Chai(ChaiRegistry),
            client,
        })
    }

    /// HTTP client shared by all adapters (and artifact downloads).
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn get(&self, kind: RegistryKind) -> &Registry {
        match kind {
            RegistryKind::Npm => &self.npm,
            RegistryKind::Python => &self.python,
            RegistryKind::Github => &self.github,
            RegistryKind::System => &self.system,
            RegistryKind::Chai => &self.chai,
        }
    }

    /// Adapter for an identifier's prefix; unknown or absent prefixes select npm.
    #[must_use]
    pub fn select(&self, identifier: &str) -> &Registry {
        self.get(RegistryKind::of_identifier(identifier).unwrap_or(RegistryKind::Npm))
    }
}

/// Build the HTTP client used for metadata and artifact requests.
///
/// # Errors
/// Returns an error if the client cannot be created.
pub fn http_client() -> Result<Client, PkgError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| PkgError::metadata(format!("Failed to create HTTP client: {e}")))
}

/// Parse an endpoint, forcing a trailing slash so `Url::join` appends.
fn base_url(raw: &str) -> Result<Url, PkgError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash)
        .map_err(|e| PkgError::metadata(format!("Invalid registry URL '{raw}': {e}")))
}

/// GET a JSON document, mapping non-success statuses to `PKG_METADATA_FETCH_FAILED`.
async fn get_json(
    request: reqwest::RequestBuilder,
    name: &str,
) -> Result<serde_json::Value, PkgError> {
    let response = request.send().await.map_err(|e| {
        PkgError::metadata(format!("Metadata request for '{name}' failed: {e}"))
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(PkgError::metadata_fetch_failed(name, status.as_u16()));
    }

    let body = response.bytes().await.map_err(|e| {
        PkgError::metadata(format!("Failed to read metadata for '{name}': {e}"))
    })?;
    serde_json::from_slice(&body)
        .map_err(|e| PkgError::metadata(format!("Invalid metadata JSON for '{name}': {e}")))
}

/// Build a URL below `base`, mapping join failures to metadata errors.
fn join_url(base: &Url, path: &str, name: &str) -> Result<Url, PkgError> {
    base.join(path)
        .map_err(|e| PkgError::metadata(format!("Failed to build URL for '{name}': {e}")))
}

/// String field of a JSON object.
fn str_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Cache extension taken from an artifact URL's file name.
fn extension_from_url(url: &str, default: &str) -> String {
    let file = url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .unwrap_or_default()
        .to_ascii_lowercase();

    for compound in [".tar.gz", ".tar.bz2", ".tar.xz"] {
        if file.ends_with(compound) {
            return compound[1..].to_string();
        }
    }
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_string(),
        _ => default.to_string(),
    }
}
