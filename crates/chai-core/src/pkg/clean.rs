//! Sandbox cache maintenance.

use super::error::PkgError;
use crate::paths::Sandbox;
use chai_util::fs::{dir_size, remove_path};
use serde::Serialize;
use std::fs;

/// Which sandbox directories to wipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanOptions {
    pub cache: bool,
    pub tmp: bool,
    /// Cache and tmp together.
    pub all: bool,
}

impl CleanOptions {
    /// With nothing selected, the artifact cache is cleaned.
    fn targets(self) -> (bool, bool) {
        if self.all || (self.cache && self.tmp) {
            (true, true)
        } else if !self.cache && !self.tmp {
            (true, false)
        } else {
            (self.cache, self.tmp)
        }
    }
}

/// One wiped directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanedDir {
    pub name: &'static str,
    pub freed_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub cleaned: Vec<CleanedDir>,
}

impl CleanReport {
    #[must_use]
    pub fn freed_bytes(&self) -> u64 {
        self.cleaned.iter().map(|c| c.freed_bytes).sum()
    }
}

/// Wipe and recreate the selected sandbox directories.
///
/// # Errors
/// Returns `PKG_STORE_ERROR` if a directory cannot be removed or recreated.
pub fn clean(sandbox: &Sandbox, options: CleanOptions) -> Result<CleanReport, PkgError> {
    let (cache, tmp) = options.targets();
    let mut report = CleanReport::default();

    for (selected, name, dir) in [
        (cache, "cache", sandbox.cache_dir()),
        (tmp, "tmp", sandbox.tmp_dir()),
    ] {
        if !selected {
            continue;
        }
        let freed_bytes = dir_size(&dir);
        remove_path(&dir)
            .and_then(|()| fs::create_dir_all(&dir))
            .map_err(|e| PkgError::store(format!("Failed to clean {}: {e}", dir.display())))?;

        tracing::info!(dir = %dir.display(), freed_bytes, "cleaned");
        report.cleaned.push(CleanedDir { name, freed_bytes });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sandbox_with_files() -> (tempfile::TempDir, Sandbox) {
        let dir = tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path());
        sandbox.ensure_dirs().unwrap();
        fs::create_dir_all(sandbox.cache_dir().join("npm")).unwrap();
        fs::write(sandbox.cache_dir().join("npm/a-1.0.0.tgz"), vec![0u8; 100]).unwrap();
        fs::write(sandbox.tmp_dir().join("scratch"), vec![0u8; 10]).unwrap();
        fs::create_dir_all(sandbox.packages_dir().join("npm/a/1.0.0")).unwrap();
        (dir, sandbox)
    }

    #[test]
    fn test_clean_defaults_to_cache() {
        let (_dir, sandbox) = sandbox_with_files();
        let report = clean(&sandbox, CleanOptions::default()).unwrap();

        assert_eq!(
            report.cleaned,
            vec![CleanedDir {
                name: "cache",
                freed_bytes: 100
            }]
        );
        assert!(sandbox.cache_dir().is_dir());
        assert!(!sandbox.cache_dir().join("npm").exists());
        assert!(sandbox.tmp_dir().join("scratch").exists());
    }

    #[test]
    fn test_clean_all_keeps_store() {
        let (_dir, sandbox) = sandbox_with_files();
        let report = clean(
            &sandbox,
            CleanOptions {
                all: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(report.freed_bytes(), 110);
        assert!(!sandbox.tmp_dir().join("scratch").exists());
        assert!(sandbox.packages_dir().join("npm/a/1.0.0").is_dir());
    }

    #[test]
    fn test_clean_tmp_only() {
        let (_dir, sandbox) = sandbox_with_files();
        let report = clean(
            &sandbox,
            CleanOptions {
                tmp: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(report.cleaned.len(), 1);
        assert_eq!(report.cleaned[0].name, "tmp");
        assert!(sandbox.cache_dir().join("npm/a-1.0.0.tgz").exists());
    }
}
