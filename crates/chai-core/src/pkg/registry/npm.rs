//! npm registry adapter.

use super::{get_json, join_url, str_field, Artifact, Dist, PackageMetadata, Repository};
use crate::pkg::error::PkgError;
use crate::pkg::version::require_version;
use chai_util::hash::{Integrity, IntegrityParseError};
use reqwest::Client;
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Clone)]
pub struct NpmRegistry {
    client: Client,
    base_url: Url,
}

impl NpmRegistry {
    #[must_use]
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Fetch the packument (package document) for a package.
    ///
    /// # Errors
    /// Returns an error if the request fails or the registry answers non-success.
    pub async fn fetch_packument(&self, name: &str) -> Result<serde_json::Value, PkgError> {
        // Scoped names keep their '@' but the separator must be encoded.
        let encoded = name.replace('/', "%2F");
        let url = join_url(&self.base_url, &encoded, name)?;
        tracing::debug!(%url, "fetching npm packument");
        get_json(self.client.get(url), name).await
    }

    pub async fn get_metadata(
        &self,
        name: &str,
        range: Option<&str>,
    ) -> Result<PackageMetadata, PkgError> {
        let packument = self.fetch_packument(name).await?;
        metadata_from_packument(name, &packument, range)
    }

    pub async fn list_versions(&self, name: &str) -> Result<Vec<String>, PkgError> {
        let packument = self.fetch_packument(name).await?;
        Ok(get_versions(&packument))
    }
}

/// Select a version from a packument and describe it.
///
/// # Errors
/// Returns `PKG_NO_VERSION_SATISFIES_RANGE` if no version matches.
pub fn metadata_from_packument(
    name: &str,
    packument: &serde_json::Value,
    range: Option<&str>,
) -> Result<PackageMetadata, PkgError> {
    let versions = get_versions(packument);
    let version = require_version(name, &versions, range, &get_dist_tags(packument))?;

    let entry = packument
        .get("versions")
        .and_then(|v| v.get(&version))
        .cloned()
        .unwrap_or_default();
    let dist = entry.get("dist");

    Ok(PackageMetadata {
        name: name.to_string(),
        description: str_field(packument, "description").or_else(|| str_field(&entry, "description")),
        homepage: str_field(&entry, "homepage").or_else(|| str_field(packument, "homepage")),
        repository: repository_of(&entry).or_else(|| repository_of(packument)),
        keywords: keywords_of(packument).or_else(|| keywords_of(&entry)),
        dist: dist.map(|dist| Dist {
            tarball: str_field(dist, "tarball"),
            shasum: str_field(dist, "shasum"),
            integrity: str_field(dist, "integrity"),
        }),
        version: Some(version),
    })
}

/// Download descriptor for npm metadata.
///
/// The SRI `dist.integrity` is the expected digest. A lone legacy SHA-1
/// `dist.shasum` cannot be checked against the SHA-2 family and is skipped.
pub(super) fn artifact(meta: &PackageMetadata) -> Result<Artifact, PkgError> {
    let dist = meta.dist.as_ref();
    let url = dist
        .and_then(|d| d.tarball.clone())
        .ok_or_else(|| {
            PkgError::download_failed(format!("No tarball URL in npm metadata for {}", meta.name))
        })?;

    let integrity = match dist.and_then(|d| d.integrity.as_deref()) {
        Some(sri) => match Integrity::parse(sri) {
            Ok(integrity) => Some(integrity),
            Err(IntegrityParseError::Unsupported(alg)) => {
                tracing::warn!(package = %meta.name, algorithm = %alg, "unverifiable integrity digest, skipping verification");
                None
            }
            Err(e) => {
                return Err(PkgError::download_failed(format!(
                    "Invalid integrity for {}: {e}",
                    meta.name
                )))
            }
        },
        None => {
            if dist.and_then(|d| d.shasum.as_deref()).is_some() {
                tracing::warn!(package = %meta.name, "only a legacy sha1 shasum is published, skipping verification");
            }
            None
        }
    };

    Ok(Artifact {
        url,
        integrity,
        extension: "tgz".to_string(),
    })
}

/// Get all available version strings from a packument.
#[must_use]
pub fn get_versions(packument: &serde_json::Value) -> Vec<String> {
    packument
        .get("versions")
        .and_then(|v| v.as_object())
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default()
}

/// `dist-tags` as a tag -> version map.
#[must_use]
pub fn get_dist_tags(packument: &serde_json::Value) -> HashMap<String, String> {
    packument
        .get("dist-tags")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(tag, v)| v.as_str().map(|v| (tag.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn repository_of(value: &serde_json::Value) -> Option<Repository> {
    value
        .get("repository")
        .and_then(|r| serde_json::from_value(r.clone()).ok())
}

fn keywords_of(value: &serde_json::Value) -> Option<Vec<String>> {
    let keywords: Vec<String> = value
        .get("keywords")?
        .as_array()?
        .iter()
        .filter_map(|k| k.as_str().map(String::from))
        .collect();
    (!keywords.is_empty()).then_some(keywords)
}
