//! Python package index adapter.

use super::{extension_from_url, get_json, join_url, str_field, Artifact, Dist, PackageMetadata};
use crate::pkg::error::PkgError;
use crate::pkg::version::require_version;
use chai_util::hash::Integrity;
use reqwest::Client;
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Clone)]
pub struct PythonRegistry {
    client: Client,
    base_url: Url,
}

impl PythonRegistry {
    #[must_use]
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Fetch `/pypi/<name>/json`.
    ///
    /// # Errors
    /// Returns an error if the request fails or the index answers non-success.
    pub async fn fetch_project(&self, name: &str) -> Result<serde_json::Value, PkgError> {
        let path = format!("pypi/{}/json", name.replace('/', "%2F"));
        let url = join_url(&self.base_url, &path, name)?;
        tracing::debug!(%url, "fetching python project");
        get_json(self.client.get(url), name).await
    }

    pub async fn get_metadata(
        &self,
        name: &str,
        range: Option<&str>,
    ) -> Result<PackageMetadata, PkgError> {
        let project = self.fetch_project(name).await?;
        metadata_from_project(name, &project, range)
    }

    pub async fn list_versions(&self, name: &str) -> Result<Vec<String>, PkgError> {
        let project = self.fetch_project(name).await?;
        Ok(release_versions(&project))
    }
}

/// Select a release and its preferred file (the sdist, else the first file).
///
/// # Errors
/// Returns `PKG_NO_VERSION_SATISFIES_RANGE` if no release matches.
pub fn metadata_from_project(
    name: &str,
    project: &serde_json::Value,
    range: Option<&str>,
) -> Result<PackageMetadata, PkgError> {
    let info = project.get("info").cloned().unwrap_or_default();
    let versions = release_versions(project);

    let mut tags = HashMap::new();
    if let Some(latest) = str_field(&info, "version") {
        tags.insert("latest".to_string(), latest);
    }
    let version = require_version(name, &versions, range, &tags)?;

    let files = project
        .get("releases")
        .and_then(|r| r.get(&version))
        .and_then(serde_json::Value::as_array)
        .cloned()
        .unwrap_or_default();
    let file = files
        .iter()
        .find(|f| f.get("packagetype").and_then(serde_json::Value::as_str) == Some("sdist"))
        .or_else(|| files.first());

    let homepage = str_field(&info, "home_page").or_else(|| {
        info.get("project_urls")
            .and_then(|urls| str_field(urls, "Homepage"))
    });

    Ok(PackageMetadata {
        name: name.to_string(),
        description: str_field(&info, "summary"),
        homepage,
        keywords: keywords_of(&info),
        dist: file.map(|f| Dist {
            tarball: str_field(f, "url"),
            shasum: f.get("digests").and_then(|d| str_field(d, "sha256")),
            integrity: None,
        }),
        repository: None,
        version: Some(version),
    })
}

/// Download descriptor; the published sha256 hex digest is verified.
pub(super) fn artifact(meta: &PackageMetadata) -> Result<Artifact, PkgError> {
    let dist = meta.dist.as_ref();
    let url = dist.and_then(|d| d.tarball.clone()).ok_or_else(|| {
        PkgError::download_failed(format!("No sdist URL in PyPI metadata for {}", meta.name))
    })?;

    let integrity = dist
        .and_then(|d| d.shasum.as_deref())
        .map(|hex| {
            Integrity::parse(hex).map_err(|e| {
                PkgError::download_failed(format!("Invalid digest for {}: {e}", meta.name))
            })
        })
        .transpose()?;

    Ok(Artifact {
        extension: extension_from_url(&url, "tar.gz"),
        url,
        integrity,
    })
}

/// Release versions listed in a project document.
#[must_use]
pub fn release_versions(project: &serde_json::Value) -> Vec<String> {
    project
        .get("releases")
        .and_then(|v| v.as_object())
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default()
}

/// PyPI keeps keywords as one comma- or space-separated string.
fn keywords_of(info: &serde_json::Value) -> Option<Vec<String>> {
    let raw = str_field(info, "keywords")?;
    let separator = if raw.contains(',') { ',' } else { ' ' };
    let keywords: Vec<String> = raw
        .split(separator)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect();
    (!keywords.is_empty()).then_some(keywords)
}
