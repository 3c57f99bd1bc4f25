//! Native chai registry adapter.

use super::PackageMetadata;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChaiRegistry;

impl ChaiRegistry {
    /// Placeholder metadata pinned to `latest`.
    #[must_use]
    pub fn get_metadata(&self, name: &str) -> PackageMetadata {
        PackageMetadata {
            name: name.to_string(),
            version: Some("latest".to_string()),
            description: Some("chai adapter placeholder metadata".to_string()),
            ..Default::default()
        }
    }
}
