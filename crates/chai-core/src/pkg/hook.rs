//! Post-install hooks.

use super::error::PkgError;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Bytes of hook stderr kept in a failure message.
const STDERR_TAIL: usize = 2048;

/// Run `script` through the platform shell inside `pkg_dir`.
///
/// # Errors
/// Returns `PKG_POST_INSTALL_HOOK_FAILED` if the shell cannot be started or
/// the script exits unsuccessfully.
pub async fn run_postinstall(pkg_dir: &Path, script: &str) -> Result<(), PkgError> {
    tracing::debug!(dir = %pkg_dir.display(), script, "running postinstall hook");

    let output = shell(script)
        .current_dir(pkg_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| PkgError::hook_failed(format!("Failed to start '{script}': {e}")))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let tail = match stderr.char_indices().rev().nth(STDERR_TAIL) {
        Some((idx, _)) => &stderr[idx..],
        None => stderr,
    };
    let status = output
        .status
        .code()
        .map_or_else(|| "signal".to_string(), |c| c.to_string());

    Err(PkgError::hook_failed(if tail.is_empty() {
        format!("'{script}' exited with {status}")
    } else {
        format!("'{script}' exited with {status}: {tail}")
    }))
}

#[cfg(unix)]
fn shell(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    cmd
}

#[cfg(windows)]
fn shell(script: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(script);
    cmd
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pkg::error::codes;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_hook_runs_in_package_dir() {
        let dir = tempdir().unwrap();
        run_postinstall(dir.path(), "echo built > marker.txt")
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("marker.txt")).unwrap().trim(),
            "built"
        );
    }

    #[tokio::test]
    async fn test_failing_hook_reports_status_and_stderr() {
        let dir = tempdir().unwrap();
        let err = run_postinstall(dir.path(), "echo boom >&2; exit 3")
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::PKG_POST_INSTALL_HOOK_FAILED);
        assert!(err.message().contains("exited with 3"));
        assert!(err.message().contains("boom"));
    }
}
