//! Package engine error types.

use std::fmt;
use std::io;

/// Package engine error codes.
pub mod codes {
    pub const PKG_INVALID_IDENTIFIER: &str = "PKG_INVALID_IDENTIFIER";
    pub const PKG_METADATA_FETCH_FAILED: &str = "PKG_METADATA_FETCH_FAILED";
    pub const PKG_NO_VERSION_SATISFIES_RANGE: &str = "PKG_NO_VERSION_SATISFIES_RANGE";
    pub const PKG_DOWNLOAD_FAILED: &str = "PKG_DOWNLOAD_FAILED";
    pub const PKG_INTEGRITY_MISMATCH: &str = "PKG_INTEGRITY_MISMATCH";
    pub const PKG_EXTRACTION_FAILED: &str = "PKG_EXTRACTION_FAILED";
    pub const PKG_MISSING_MANIFEST: &str = "PKG_MISSING_MANIFEST";
    pub const PKG_POST_INSTALL_HOOK_FAILED: &str = "PKG_POST_INSTALL_HOOK_FAILED";

    pub const PKG_MANIFEST_INVALID: &str = "PKG_MANIFEST_INVALID";
    pub const PKG_LINK_FAILED: &str = "PKG_LINK_FAILED";
    pub const PKG_STORE_ERROR: &str = "PKG_STORE_ERROR";
    pub const PKG_LOCKFILE_ERROR: &str = "PKG_LOCKFILE_ERROR";
}

/// Package engine error.
#[derive(Debug, Clone)]
pub struct PkgError {
    code: &'static str,
    message: String,
    status: Option<u16>,
}

impl PkgError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Transport status, for metadata and download failures.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Prefix the message with the identifier, name or `name@version` it concerns.
    #[must_use]
    pub fn with_subject(mut self, subject: &str) -> Self {
        if !self.message.starts_with(subject) {
            self.message = format!("{subject}: {}", self.message);
        }
        self
    }

    pub fn invalid_identifier(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_INVALID_IDENTIFIER, msg)
    }

    #[must_use]
    pub fn metadata_fetch_failed(name: &str, status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::new(
                codes::PKG_METADATA_FETCH_FAILED,
                format!("Metadata fetch for '{name}' failed with status {status}"),
            )
        }
    }

    /// Metadata fetch failure that never produced a status (connect error, bad JSON).
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_METADATA_FETCH_FAILED, msg)
    }

    #[must_use]
    pub fn no_version(name: &str, range: Option<&str>) -> Self {
        Self::new(
            codes::PKG_NO_VERSION_SATISFIES_RANGE,
            format!(
                "No version of {name} satisfies range: {}",
                range.unwrap_or("latest")
            ),
        )
    }

    #[must_use]
    pub fn download_status(url: &str, status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::new(
                codes::PKG_DOWNLOAD_FAILED,
                format!("Download failed with status {status} for '{url}'"),
            )
        }
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_DOWNLOAD_FAILED, msg)
    }

    /// Both digests are kept verbatim for manual audit.
    #[must_use]
    pub fn integrity_mismatch(expected: &str, actual: &str) -> Self {
        Self::new(
            codes::PKG_INTEGRITY_MISMATCH,
            format!("Integrity mismatch:\n  expected: {expected}\n  actual:   {actual}"),
        )
    }

    pub fn extraction_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_EXTRACTION_FAILED, msg)
    }

    #[must_use]
    pub fn missing_manifest(dir: &std::path::Path) -> Self {
        Self::new(
            codes::PKG_MISSING_MANIFEST,
            format!("No manifest found in {}", dir.display()),
        )
    }

    pub fn hook_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_POST_INSTALL_HOOK_FAILED, msg)
    }

    pub fn manifest_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_MANIFEST_INVALID, msg)
    }

    pub fn link_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_LINK_FAILED, msg)
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_STORE_ERROR, msg)
    }

    pub fn lockfile(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_LOCKFILE_ERROR, msg)
    }
}

impl fmt::Display for PkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PkgError {}

impl From<io::Error> for PkgError {
    fn from(e: io::Error) -> Self {
        Self::store(e.to_string())
    }
}

impl From<reqwest::Error> for PkgError {
    fn from(e: reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            format!("Request timed out: {e}")
        } else if e.is_connect() {
            format!("Connection failed: {e}")
        } else {
            e.to_string()
        };
        Self {
            status: e.status().map(|s| s.as_u16()),
            ..Self::metadata(message)
        }
    }
}

impl From<serde_json::Error> for PkgError {
    fn from(e: serde_json::Error) -> Self {
        Self::metadata(format!("Invalid JSON: {e}"))
    }
}
