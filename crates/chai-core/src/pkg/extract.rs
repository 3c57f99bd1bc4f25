//! Archive extraction.
//!
//! Archives are unpacked with one leading path component stripped, into a
//! uniquely named staging directory next to the destination, which is then
//! renamed into place. A failed extraction never leaves a partial destination.

use super::error::PkgError;
use chai_util::fs::{copy_dir_all, remove_path, unique_sibling};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;

/// Extract a gzip-compressed or plain tar archive into `dest`.
///
/// Gzip is tried first; a plain tar read is the fallback. An existing `dest`
/// is replaced.
///
/// # Errors
/// Returns `PKG_EXTRACTION_FAILED` with both causes if neither attempt succeeds.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), PkgError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let staging = unique_sibling(dest, "staging");
    let result = unpack_with_fallback(archive, &staging);
    if let Err(e) = result {
        let _ = remove_path(&staging);
        return Err(e);
    }

    let installed = install_staging(&staging, dest);
    let _ = remove_path(&staging);
    installed
}

fn unpack_with_fallback(archive: &Path, staging: &Path) -> Result<(), PkgError> {
    let gzip_err = match File::open(archive)
        .map_err(|e| e.to_string())
        .and_then(|file| unpack_fresh(GzDecoder::new(file), staging))
    {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    tracing::debug!(archive = %archive.display(), error = %gzip_err, "not gzip, retrying as plain tar");

    match File::open(archive)
        .map_err(|e| e.to_string())
        .and_then(|file| unpack_fresh(file, staging))
    {
        Ok(()) => Ok(()),
        Err(plain_err) => Err(PkgError::extraction_failed(format!(
            "Failed to extract {}: gzip: {gzip_err}; plain tar: {plain_err}",
            archive.display()
        ))),
    }
}

/// Unpack into an empty `dir`, discarding whatever an earlier attempt left.
fn unpack_fresh<R: Read>(reader: R, dir: &Path) -> Result<(), String> {
    remove_path(dir).map_err(|e| e.to_string())?;
    fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    unpack_stripped(reader, dir)
}

fn unpack_stripped<R: Read>(reader: R, dest: &Path) -> Result<(), String> {
    let mut archive = Archive::new(reader);
    let mut entries_seen = 0usize;

    for entry in archive
        .entries()
        .map_err(|e| format!("Failed to read archive entries: {e}"))?
    {
        let mut entry = entry.map_err(|e| format!("Failed to read archive entry: {e}"))?;
        entries_seen += 1;

        let path = entry
            .path()
            .map_err(|e| format!("Failed to read entry path: {e}"))?
            .into_owned();

        let Some(relative) = strip_first_component(&path)? else {
            continue;
        };
        let dest_path = dest.join(&relative);

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path).map_err(|e| e.to_string())?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
            let mut file = File::create(&dest_path).map_err(|e| e.to_string())?;
            io::copy(&mut entry, &mut file).map_err(|e| e.to_string())?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(mode) = entry.header().mode() {
                    let _ = fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode));
                }
            }
        }
        // Symlinks, hard links and device entries are skipped.
    }

    if entries_seen == 0 {
        return Err("archive contains no entries".to_string());
    }
    Ok(())
}

/// Drop the leading component of an entry path.
///
/// Returns `None` for the top-level entry itself (and for single-component
/// entries such as `pax_global_header`). Absolute paths and `..` are rejected.
fn strip_first_component(path: &Path) -> Result<Option<PathBuf>, String> {
    let mut stripped = PathBuf::new();
    let mut first = true;

    for component in path.components() {
        match component {
            Component::Normal(part) => {
                if first {
                    first = false;
                } else {
                    stripped.push(part);
                }
            }
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(format!("Archive contains path traversal: {}", path.display()))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("Archive contains absolute path: {}", path.display()))
            }
        }
    }

    Ok((!stripped.as_os_str().is_empty()).then_some(stripped))
}

/// Move a fully extracted staging tree onto `dest`.
fn install_staging(staging: &Path, dest: &Path) -> Result<(), PkgError> {
    remove_path(dest)?;

    match fs::rename(staging, dest) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Another installer won the race for the same version.
            if dest.exists() {
                return Ok(());
            }

            // Cross-filesystem fallback.
            copy_dir_all(staging, dest).map_err(|copy_err| {
                let _ = remove_path(dest);
                PkgError::extraction_failed(format!(
                    "Failed to move or copy extracted package: rename={e}, copy={copy_err}"
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tar::Builder;
    use tempfile::tempdir;

    fn tar_of(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = Builder::new(&mut tar_bytes);
            for (path, data) in entries {
                let mut header = tar::Header::new_gnu();
                header.set_path(path).unwrap();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append(&header, data.as_bytes()).unwrap();
            }
            builder.finish().unwrap();
        }
        tar_bytes
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn sample() -> Vec<u8> {
        tar_of(&[
            ("package/package.json", r#"{"name":"test","version":"1.0.0"}"#),
            ("package/index.js", "module.exports = 42;"),
            ("package/lib/deep/nested/util.js", "exports.x = 1;"),
        ])
    }

    fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut files: Vec<_> = walkdir(dir)
            .into_iter()
            .map(|p| {
                let data = fs::read(&p).unwrap();
                (p.strip_prefix(dir).unwrap().to_path_buf(), data)
            })
            .collect();
        files.sort();
        files
    }

    fn walkdir(dir: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                out.extend(walkdir(&path));
            } else {
                out.push(path);
            }
        }
        out
    }

    #[test]
    fn test_extract_gzip_strips_top_level() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pkg.tgz");
        fs::write(&archive, gzip(&sample())).unwrap();

        let dest = dir.path().join("store").join("test").join("1.0.0");
        extract_archive(&archive, &dest).unwrap();

        assert!(dest.join("package.json").exists());
        assert!(dest.join("index.js").exists());
        assert!(dest.join("lib/deep/nested/util.js").exists());
        assert!(!dest.join("package").exists());
    }

    #[test]
    fn test_extract_plain_tar_fallback() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pkg.tar");
        fs::write(&archive, sample()).unwrap();

        let dest = dir.path().join("out");
        extract_archive(&archive, &dest).unwrap();
        assert_eq!(
            fs::read_to_string(dest.join("index.js")).unwrap(),
            "module.exports = 42;"
        );
    }

    #[test]
    fn test_extract_twice_is_identical() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pkg.tgz");
        fs::write(&archive, gzip(&sample())).unwrap();
        let dest = dir.path().join("out");

        extract_archive(&archive, &dest).unwrap();
        let first = snapshot(&dest);
        extract_archive(&archive, &dest).unwrap();
        let second = snapshot(&dest);

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_reextraction_replaces_stale_files() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pkg.tgz");
        fs::write(&archive, gzip(&sample())).unwrap();
        let dest = dir.path().join("out");

        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.txt"), "old").unwrap();

        extract_archive(&archive, &dest).unwrap();
        assert!(!dest.join("stale.txt").exists());
        assert!(dest.join("index.js").exists());
    }

    #[test]
    fn test_garbage_fails_with_both_causes() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("junk.tgz");
        fs::write(&archive, b"definitely not an archive").unwrap();
        let dest = dir.path().join("out");

        let err = extract_archive(&archive, &dest).unwrap_err();
        assert_eq!(err.code(), crate::pkg::error::codes::PKG_EXTRACTION_FAILED);
        assert!(err.message().contains("gzip:"));
        assert!(err.message().contains("plain tar:"));
        assert!(!dest.exists());

        // No staging directories are left behind.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains("staging"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_strip_first_component() {
        assert_eq!(
            strip_first_component(Path::new("package/a/b.js")).unwrap(),
            Some(PathBuf::from("a/b.js"))
        );
        assert_eq!(strip_first_component(Path::new("package/")).unwrap(), None);
        assert_eq!(strip_first_component(Path::new("pax_global_header")).unwrap(), None);
        assert_eq!(
            strip_first_component(Path::new("./repo-main/src/x.rs")).unwrap(),
            Some(PathBuf::from("src/x.rs"))
        );
        assert!(strip_first_component(Path::new("package/../../etc/passwd")).is_err());
        assert!(strip_first_component(Path::new("/etc/passwd")).is_err());
    }
}
