//! GitHub adapter: releases, tags and default-branch source archives.

use super::{get_json, join_url, str_field, Artifact, Dist, PackageMetadata};
use crate::pkg::error::PkgError;
use crate::pkg::version::pick_version;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use std::collections::HashMap;
use url::Url;

/// Version reported when falling back to the default-branch archive.
pub const FALLBACK_VERSION: &str = "latest";

#[derive(Debug, Clone)]
pub struct GithubRegistry {
    client: Client,
    api_url: Url,
    web_url: Url,
    token: Option<String>,
}

impl GithubRegistry {
    #[must_use]
    pub fn new(client: Client, api_url: Url, web_url: Url, token: Option<String>) -> Self {
        Self {
            client,
            api_url,
            web_url,
            token,
        }
    }

    fn request(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json");
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    /// Without a range: the latest release, or the default-branch archive when
    /// the repository has no releases. With a range: the best matching tag.
    ///
    /// # Errors
    /// Returns `PKG_METADATA_FETCH_FAILED` for non-success answers other than
    /// a missing latest release.
    pub async fn get_metadata(
        &self,
        name: &str,
        range: Option<&str>,
    ) -> Result<PackageMetadata, PkgError> {
        match range.map(str::trim).filter(|r| !r.is_empty()) {
            None | Some(FALLBACK_VERSION) => self.latest_release(name).await,
            Some(range) => self.matching_tag(name, range).await,
        }
    }

    async fn latest_release(&self, name: &str) -> Result<PackageMetadata, PkgError> {
        let url = join_url(&self.api_url, &format!("repos/{name}/releases/latest"), name)?;
        tracing::debug!(%url, "fetching latest github release");

        match get_json(self.request(url), name).await {
            Ok(release) => Ok(self.release_metadata(name, &release)),
            Err(e) if e.status() == Some(404) => {
                tracing::debug!(repo = name, "no releases, using default branch archive");
                Ok(self.fallback_metadata(name))
            }
            Err(e) => Err(e),
        }
    }

    async fn matching_tag(&self, name: &str, range: &str) -> Result<PackageMetadata, PkgError> {
        let tags = self.fetch_tags(name).await?;
        let names: Vec<&str> = tags.iter().map(|(tag, _)| tag.as_str()).collect();
        let tag = pick_version(&names, Some(range), &HashMap::new())
            .ok_or_else(|| PkgError::no_version(name, Some(range)))?;

        let tarball = tags
            .iter()
            .find(|(candidate, _)| *candidate == tag)
            .and_then(|(_, url)| url.clone())
            .unwrap_or_else(|| self.tag_archive_url(name, &tag));

        Ok(PackageMetadata {
            name: name.to_string(),
            dist: Some(Dist {
                tarball: Some(tarball),
                ..Default::default()
            }),
            homepage: Some(self.repo_url(name)),
            version: Some(tag),
            ..Default::default()
        })
    }

    /// Tag names with their API tarball URLs.
    async fn fetch_tags(&self, name: &str) -> Result<Vec<(String, Option<String>)>, PkgError> {
        let url = join_url(&self.api_url, &format!("repos/{name}/tags?per_page=100"), name)?;
        tracing::debug!(%url, "fetching github tags");
        let tags = get_json(self.request(url), name).await?;

        Ok(tags
            .as_array()
            .map(|tags| {
                tags.iter()
                    .filter_map(|tag| {
                        str_field(tag, "name").map(|n| (n, str_field(tag, "tarball_url")))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn list_versions(&self, name: &str) -> Result<Vec<String>, PkgError> {
        Ok(self
            .fetch_tags(name)
            .await?
            .into_iter()
            .map(|(tag, _)| tag)
            .collect())
    }

    fn release_metadata(&self, name: &str, release: &serde_json::Value) -> PackageMetadata {
        let tag = str_field(release, "tag_name").unwrap_or_else(|| FALLBACK_VERSION.to_string());
        let tarball = str_field(release, "tarball_url")
            .unwrap_or_else(|| self.tag_archive_url(name, &tag));

        PackageMetadata {
            name: name.to_string(),
            description: str_field(release, "name"),
            dist: Some(Dist {
                tarball: Some(tarball),
                ..Default::default()
            }),
            homepage: Some(self.repo_url(name)),
            version: Some(tag),
            ..Default::default()
        }
    }

    fn fallback_metadata(&self, name: &str) -> PackageMetadata {
        PackageMetadata {
            name: name.to_string(),
            version: Some(FALLBACK_VERSION.to_string()),
            description: Some("GitHub latest source (no releases)".to_string()),
            dist: Some(Dist {
                tarball: Some(format!(
                    "{}{name}/archive/refs/heads/main.tar.gz",
                    self.web_url
                )),
                ..Default::default()
            }),
            homepage: Some(self.repo_url(name)),
            ..Default::default()
        }
    }

    fn repo_url(&self, name: &str) -> String {
        format!("{}{name}", self.web_url)
    }

    fn tag_archive_url(&self, name: &str, tag: &str) -> String {
        format!("{}{name}/archive/refs/tags/{tag}.tar.gz", self.web_url)
    }
}

/// Source archives carry no published digest.
pub(super) fn artifact(meta: &PackageMetadata) -> Result<Artifact, PkgError> {
    let url = meta
        .dist
        .as_ref()
        .and_then(|d| d.tarball.clone())
        .ok_or_else(|| {
            PkgError::download_failed(format!("No tarball URL in GitHub metadata for {}", meta.name))
        })?;

    Ok(Artifact {
        url,
        integrity: None,
        extension: "tar.gz".to_string(),
    })
}

/// GitHub names must be `owner/repo`.
pub(super) fn validate_repo_name(identifier: &str, name: &str) -> Result<(), PkgError> {
    let valid = matches!(
        name.split('/').collect::<Vec<_>>().as_slice(),
        [owner, repo] if !owner.is_empty() && !repo.is_empty() && *owner != ".." && *repo != ".."
    );
    if valid {
        Ok(())
    } else {
        Err(PkgError::invalid_identifier(format!(
            "Invalid GitHub identifier '{identifier}': expected owner/repo"
        )))
    }
}
