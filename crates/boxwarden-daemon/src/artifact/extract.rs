//! Archive unpacking and staging-area housekeeping.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use super::AcquireError;

/// Run `tar -xzf <archive> -C <dest>` and require a zero exit status.
pub(super) async fn untar(archive: &Path, dest: &Path) -> Result<(), AcquireError> {
    debug!(archive = %archive.display(), dest = %dest.display(), "exec: tar -xzf");
    let status = Command::new("tar")
        .arg("-xzf")
        .arg(archive)
        .arg("-C")
        .arg(dest)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| AcquireError::ExtractionFailed(format!("failed to run tar: {e}")))?;

    if !status.success() {
        return Err(AcquireError::ExtractionFailed(format!(
            "tar exited with {status}"
        )));
    }
    Ok(())
}

/// Find the unpacked executable called `name` under `staging`.
///
/// Release archives contain a single `sing-box-<version>-<os>-<arch>/`
/// directory, so a child directory whose name contains `name` is checked
/// first. Otherwise the whole tree is searched for a regular file `name`.
pub(super) fn locate_binary(staging: &Path, name: &str) -> Option<PathBuf> {
    if let Ok(entries) = std::fs::read_dir(staging) {
        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_dir()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.contains(name))
            })
            .collect();
        dirs.sort();
        if let Some(found) = dirs.iter().map(|d| d.join(name)).find(|p| p.is_file()) {
            return Some(found);
        }
    }
    find_file_named(staging, name)
}

fn find_file_named(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .collect();
    entries.sort();

    for path in &entries {
        let Ok(meta) = std::fs::symlink_metadata(path) else {
            continue;
        };
        if meta.is_file() && path.file_name().and_then(|n| n.to_str()) == Some(name) {
            return Some(path.clone());
        }
    }
    entries
        .iter()
        .filter(|p| std::fs::symlink_metadata(p).is_ok_and(|m| m.is_dir()))
        .find_map(|p| find_file_named(p, name))
}

/// Remove everything under `staging` (and `staging` itself), deepest entries
/// first, except `keep`. Failures are logged and skipped.
pub(super) fn clear_staging(staging: &Path, keep: &Path) {
    let mut paths = Vec::new();
    collect_tree(staging, &mut paths);
    paths.push(staging.to_path_buf());
    paths.sort_by_key(|p| std::cmp::Reverse(p.components().count()));

    for path in paths {
        if path == keep || keep.starts_with(&path) {
            continue;
        }
        let result = match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir(&path),
            Ok(_) => std::fs::remove_file(&path),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to remove extraction leftover");
        }
    }
}

fn collect_tree(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if entry.file_type().is_ok_and(|t| t.is_dir()) {
            collect_tree(&path, out);
        }
        out.push(path);
    }
}
