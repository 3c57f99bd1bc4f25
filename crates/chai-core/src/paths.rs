//! Sandbox directory layout.
//!
//! Everything chai writes lives under one root (`~/.chai` by default):
//!
//! ```text
//! ~/.chai/
//!   packages/<kind>/<name>/<version>/   extracted packages
//!   cache/<kind>/<name>-<version>.<ext> downloaded artifacts
//!   bin/                                linked executables
//!   tmp/                                staging and non-persistent installs
//!   logs/
//!   config.json
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the sandbox root.
pub const HOME_ENV: &str = "CHAI_HOME";

/// Name of the sandbox directory below the user's home.
pub const SANDBOX_DIR_NAME: &str = ".chai";

/// Default sandbox root: `~/.chai`.
#[must_use]
pub fn default_home() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| home.join(SANDBOX_DIR_NAME))
}

/// Find the project root by walking up from `cwd` looking for a manifest or `.git`.
///
/// Returns the first directory containing `manifest.chai.json`, `package.json`
/// or `.git`, or `None` if none is found.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join(crate::pkg::manifest::CHAI_MANIFEST).exists()
            || current.join(crate::pkg::manifest::PACKAGE_JSON).exists()
            || current.join(".git").exists()
        {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Resolved sandbox paths.
///
/// Constructed once from [`crate::Config`] and passed by reference to every
/// component that touches the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    #[must_use]
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Create the root and all sandbox subdirectories.
    ///
    /// # Errors
    /// Returns an error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        for dir in [
            self.packages_dir(),
            self.cache_dir(),
            self.bin_dir(),
            self.tmp_dir(),
            self.logs_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
