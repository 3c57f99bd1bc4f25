//! Exposing package executables in the sandbox `bin/` directory.
//!
//! Each executable is linked with [`symlink_strategy`]; when the host refuses
//! symbolic links, [`copy_strategy`] copies the file instead. Entries that fail
//! both are skipped.

use super::error::PkgError;
use super::manifest::{BinMap, PackageManifest};
use chai_util::fs::remove_path;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Executables exposed by one [`link_binaries`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    /// Names now present in the bin directory, in bin-map order.
    pub linked: Vec<String>,
}

/// How an executable ended up in the bin directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMethod {
    Symlink,
    Copy,
}

/// Bin map for a package: the caller's manifest if it declares executables,
/// else the package's own manifest.
///
/// # Errors
/// Returns `PKG_MANIFEST_INVALID` if the package's own manifest cannot be parsed.
pub fn resolve_bin_map(
    pkg_dir: &Path,
    manifest: Option<&PackageManifest>,
) -> Result<BinMap, PkgError> {
    if let Some(bins) = manifest.map(PackageManifest::bin_map).filter(|m| !m.is_empty()) {
        return Ok(bins);
    }
    Ok(PackageManifest::read_dir(pkg_dir)?
        .map(|own| own.bin_map())
        .unwrap_or_default())
}

/// Link every executable declared for the package at `pkg_dir` into `bin_dir`.
///
/// Failures are per entry and never abort the call.
///
/// # Errors
/// Returns an error only if the bin map cannot be read or `bin_dir` cannot be created.
pub fn link_binaries(
    pkg_dir: &Path,
    bin_dir: &Path,
    manifest: Option<&PackageManifest>,
) -> Result<LinkReport, PkgError> {
    let bins = resolve_bin_map(pkg_dir, manifest)?;
    let mut report = LinkReport::default();
    if bins.is_empty() {
        return Ok(report);
    }

    fs::create_dir_all(bin_dir).map_err(|e| {
        PkgError::link_failed(format!("Failed to create {}: {e}", bin_dir.display()))
    })?;

    for (name, relative) in &bins {
        match link_one(pkg_dir, bin_dir, name, relative) {
            Ok(method) => {
                tracing::debug!(bin = %name, ?method, "linked executable");
                report.linked.push(name.clone());
            }
            Err(e) => tracing::warn!(bin = %name, error = %e, "skipping executable"),
        }
    }

    Ok(report)
}

fn link_one(pkg_dir: &Path, bin_dir: &Path, name: &str, relative: &str) -> Result<LinkMethod, PkgError> {
    if !is_valid_bin_name(name) {
        return Err(PkgError::link_failed(format!("Invalid executable name '{name}'")));
    }
    let target = bin_target(pkg_dir, relative)
        .ok_or_else(|| PkgError::link_failed(format!("Invalid executable path '{relative}'")))?;
    if !target.is_file() {
        return Err(PkgError::link_failed(format!(
            "Executable {} does not exist",
            target.display()
        )));
    }

    let link = bin_dir.join(name);
    remove_path(&link)
        .map_err(|e| PkgError::link_failed(format!("Failed to replace {}: {e}", link.display())))?;
    make_executable(&target);

    match symlink_strategy(&target, &link) {
        Ok(()) => Ok(LinkMethod::Symlink),
        Err(symlink_err) => {
            tracing::debug!(bin = name, error = %symlink_err, "symlink refused, copying");
            copy_strategy(&target, &link)
                .map(|()| LinkMethod::Copy)
                .map_err(|copy_err| {
                    PkgError::link_failed(format!(
                        "symlink failed ({symlink_err}), copy failed ({copy_err})"
                    ))
                })
        }
    }
}

/// Point `link` at `target` with a symbolic link.
///
/// # Errors
/// Returns the host's error when symbolic links cannot be created.
pub fn symlink_strategy(target: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(target, link)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (target, link);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "symbolic links are not supported on this platform",
        ))
    }
}

/// Copy `target`'s bytes to `link` and mark the copy executable.
///
/// # Errors
/// Returns an error if the file cannot be copied.
pub fn copy_strategy(target: &Path, link: &Path) -> io::Result<()> {
    fs::copy(target, link)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(link, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

/// Names are single file names: no separators, no `.`/`..`.
fn is_valid_bin_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}

/// Resolve a bin path inside the package; paths escaping it are rejected.
fn bin_target(pkg_dir: &Path, relative: &str) -> Option<PathBuf> {
    let mut target = pkg_dir.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (target != pkg_dir).then_some(target)
}

fn make_executable(target: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = fs::metadata(target) {
            let mode = meta.permissions().mode();
            if mode & 0o111 != 0o111 {
                let _ = fs::set_permissions(target, fs::Permissions::from_mode(mode | 0o755));
            }
        }
    }
    #[cfg(not(unix))]
    let _ = target;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::manifest::{BinField, ManifestSource};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn package(dir: &Path, manifest: &str, files: &[&str]) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("package.json"), manifest).unwrap();
        for file in files {
            let path = dir.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "#!/bin/sh\necho hi\n").unwrap();
        }
    }

    #[test]
    fn test_links_object_form_bins() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        let bin = dir.path().join("bin");
        package(
            &pkg,
            r#"{"name":"tool","bin":{"tool":"cli.js","tool-dev":"bin/dev.js"}}"#,
            &["cli.js", "bin/dev.js"],
        );

        let report = link_binaries(&pkg, &bin, None).unwrap();
        assert_eq!(report.linked, vec!["tool", "tool-dev"]);
        assert_eq!(
            fs::read_to_string(bin.join("tool")).unwrap(),
            "#!/bin/sh\necho hi\n"
        );
    }

    #[test]
    fn test_string_form_binds_unscoped_name() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        let bin = dir.path().join("bin");
        package(&pkg, r#"{"name":"@acme/thing","bin":"run.js"}"#, &["run.js"]);

        let report = link_binaries(&pkg, &bin, None).unwrap();
        assert_eq!(report.linked, vec!["thing"]);
        assert!(bin.join("thing").exists());
    }

    #[test]
    fn test_caller_manifest_wins() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        package(&pkg, r#"{"name":"own","bin":"own.js"}"#, &["own.js", "other.js"]);

        let caller = PackageManifest {
            source: ManifestSource::Chai,
            name: Some("caller".to_string()),
            version: None,
            package_type: None,
            description: None,
            dependencies: BTreeMap::new(),
            bin: Some(BinField::Single("other.js".to_string())),
            postinstall: None,
        };
        let bins = resolve_bin_map(&pkg, Some(&caller)).unwrap();
        assert_eq!(bins, BTreeMap::from([("caller".to_string(), "other.js".to_string())]));

        let fallback = resolve_bin_map(&pkg, None).unwrap();
        assert_eq!(fallback, BTreeMap::from([("own".to_string(), "own.js".to_string())]));
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        let bin = dir.path().join("bin");
        package(
            &pkg,
            r#"{"name":"x","bin":{"good":"a.js","missing":"nope.js","escape":"../../etc/passwd","../evil":"a.js"}}"#,
            &["a.js"],
        );

        let report = link_binaries(&pkg, &bin, None).unwrap();
        assert_eq!(report.linked, vec!["good"]);
        assert!(!bin.join("missing").exists());
        assert!(!dir.path().join("evil").exists());
    }

    #[test]
    fn test_relink_replaces_existing_entry() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        let bin = dir.path().join("bin");
        package(&pkg, r#"{"name":"tool","bin":"cli.js"}"#, &["cli.js"]);
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("tool"), "stale").unwrap();

        link_binaries(&pkg, &bin, None).unwrap();
        link_binaries(&pkg, &bin, None).unwrap();
        assert_eq!(
            fs::read_to_string(bin.join("tool")).unwrap(),
            "#!/bin/sh\necho hi\n"
        );
    }

    #[test]
    fn test_no_bins_is_empty_report() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        package(&pkg, r#"{"name":"lib"}"#, &[]);
        let bin = dir.path().join("bin");

        assert!(link_binaries(&pkg, &bin, None).unwrap().linked.is_empty());
        assert!(!bin.exists());
    }

    #[test]
    fn test_copy_strategy_is_executable() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("src.sh");
        fs::write(&target, "echo").unwrap();
        let link = dir.path().join("copy");

        copy_strategy(&target, &link).unwrap();
        assert_eq!(fs::read_to_string(&link).unwrap(), "echo");
        assert!(!fs::symlink_metadata(&link).unwrap().file_type().is_symlink());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&link).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_strategy_points_at_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("src.sh");
        fs::write(&target, "echo").unwrap();
        let link = dir.path().join("link");

        symlink_strategy(&target, &link).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), target);
        // Occupied path fails, which is what triggers the copy fallback.
        assert!(symlink_strategy(&target, &link).is_err());
    }

    #[test]
    fn test_bin_target_rejects_escapes() {
        let root = Path::new("/pkg");
        assert_eq!(bin_target(root, "./bin/x"), Some(PathBuf::from("/pkg/bin/x")));
        assert_eq!(bin_target(root, "../x"), None);
        assert_eq!(bin_target(root, "/etc/passwd"), None);
        assert_eq!(bin_target(root, "."), None);
    }
}
