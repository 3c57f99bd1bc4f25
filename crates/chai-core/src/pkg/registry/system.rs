//! System package adapter.
//!
//! OS packages are not fetched: metadata is a local placeholder and the
//! install only records the dependency.

use super::PackageMetadata;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRegistry;

impl SystemRegistry {
    /// Placeholder metadata; no version is resolved.
    #[must_use]
    pub fn get_metadata(&self, name: &str) -> PackageMetadata {
        PackageMetadata {
            name: name.to_string(),
            description: Some("system adapter placeholder metadata".to_string()),
            ..Default::default()
        }
    }
}
