//! Streaming artifact download with integrity verification.

use super::error::PkgError;
use chai_util::hash::{Integrity, IntegrityHasher};
use futures::StreamExt;
use reqwest::header::ACCEPT_ENCODING;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Suffix of the file an artifact streams into before it is verified.
pub const PARTIAL_SUFFIX: &str = "partial";

/// A downloaded and verified artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub path: PathBuf,
    /// SHA-512 digest of the bytes on disk.
    pub integrity: Integrity,
    pub size: u64,
}

/// Path an in-flight download of `dest` is written to.
#[must_use]
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

/// Stream `url` to `dest`, hashing while writing.
///
/// Bytes land in `<dest>.partial` (truncating anything a previous interrupted
/// attempt left behind) and are renamed onto `dest` only once the digest has
/// been checked against `expected`. On mismatch the partial file is removed.
///
/// # Errors
/// Returns `PKG_DOWNLOAD_FAILED` for transport failures or non-success
/// statuses, and `PKG_INTEGRITY_MISMATCH` when the digest differs.
pub async fn fetch_and_verify(
    client: &Client,
    url: &str,
    dest: &Path,
    expected: Option<&Integrity>,
) -> Result<Fetched, PkgError> {
    tracing::debug!(url, dest = %dest.display(), "downloading artifact");

    let response = client
        .get(url)
        .header(ACCEPT_ENCODING, "identity")
        .send()
        .await
        .map_err(|e| PkgError::download_failed(format!("Failed to download '{url}': {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PkgError::download_status(url, status.as_u16()));
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    let partial = partial_path(dest);
    let mut file = fs::File::create(&partial).await?;
    let mut hasher = IntegrityHasher::new(expected.map(Integrity::algorithm));
    let mut size = 0u64;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&partial).await;
                return Err(PkgError::download_failed(format!(
                    "Failed to read response body from '{url}': {e}"
                )));
            }
        };
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    let digests = hasher.finish();
    if let Some(expected) = expected {
        let verified = digests
            .get(expected.algorithm())
            .is_some_and(|actual| actual == expected);
        if !verified {
            let actual = digests
                .get(expected.algorithm())
                .unwrap_or(&digests.sha512)
                .to_sri();
            let _ = fs::remove_file(&partial).await;
            return Err(PkgError::integrity_mismatch(&expected.to_sri(), &actual).with_subject(url));
        }
    } else {
        tracing::debug!(url, integrity = %digests.sha512, "no expected digest, recorded sha512");
    }

    fs::rename(&partial, dest).await?;

    Ok(Fetched {
        path: dest.to_path_buf(),
        integrity: digests.sha512,
        size,
    })
}
