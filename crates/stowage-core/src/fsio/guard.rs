//! Deletion guards and TTL validity checks.
//!
//! Every delete path in the cache layer funnels through [`safe_remove`],
//! which resolves symlinks and refuses to touch anything outside the
//! configured dataset root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{error, warn};

const SECONDS_PER_DAY: f64 = 60.0 * 60.0 * 24.0;

/// Resolve a path for containment checking.
///
/// Existing paths are canonicalized (following symlinks). For a path that
/// does not exist yet, the parent is canonicalized and the file name
/// re-attached, so `..` segments still collapse before the check.
fn resolve_for_check(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = path.canonicalize() {
        return Some(resolved);
    }
    let parent = path.parent()?;
    let name = path.file_name()?;
    parent.canonicalize().ok().map(|p| p.join(name))
}

/// Remove a file or directory if it resolves inside `allowed_root`.
///
/// Returns `true` if the target was removed or did not exist, `false` if
/// the containment check failed or removal errored. Refusals are logged,
/// never silent.
pub fn safe_remove(path: &Path, allowed_root: &Path) -> bool {
    let root = match allowed_root.canonicalize() {
        Ok(root) => root,
        Err(err) => {
            error!(root = %allowed_root.display(), %err, "cannot resolve allowed root; refusing removal");
            return false;
        }
    };
    let resolved = match resolve_for_check(path) {
        Some(resolved) => resolved,
        None => {
            error!(path = %path.display(), "cannot resolve removal target; refusing removal");
            return false;
        }
    };
    if !resolved.starts_with(&root) {
        error!(
            path = %resolved.display(),
            root = %root.display(),
            "refusing to remove path outside dataset root"
        );
        return false;
    }

    let result = if resolved.is_dir() {
        fs::remove_dir_all(&resolved)
    } else if resolved.is_file() {
        fs::remove_file(&resolved)
    } else {
        // Already gone (or a dangling symlink the resolve step dropped).
        return true;
    };

    match result {
        Ok(()) => true,
        Err(err) => {
            error!(path = %resolved.display(), %err, "failed to remove path");
            false
        }
    }
}

/// Age of a file in days, from its modification time.
///
/// A modification time in the future yields age zero.
pub fn file_age_days(path: &Path) -> Option<f64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default();
    Some(age.as_secs_f64() / SECONDS_PER_DAY)
}

/// TTL check against an age already measured in days.
///
/// The boundary is inclusive: a file aged exactly `ttl_days` is still
/// valid. A `None` TTL never expires.
pub fn is_age_valid(age_days: f64, max_age_days: Option<u32>) -> bool {
    match max_age_days {
        None => true,
        Some(ttl) => age_days <= f64::from(ttl),
    }
}

/// Check that a cache file exists and is within its TTL.
pub fn is_file_valid(path: &Path, max_age_days: Option<u32>) -> bool {
    if !path.is_file() {
        return false;
    }
    if max_age_days.is_none() {
        return true;
    }
    match file_age_days(path) {
        Some(age) => is_age_valid(age, max_age_days),
        None => {
            warn!(path = %path.display(), "cannot read file mtime; treating as expired");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn age_boundary_is_inclusive() {
        assert!(is_age_valid(21.0, Some(21)));
        assert!(!is_age_valid(21.0001, Some(21)));
        assert!(is_age_valid(10_000.0, None));
        assert!(is_age_valid(0.0, Some(0)));
    }

    #[test]
    fn missing_file_is_invalid() {
        assert!(!is_file_valid(Path::new("/nonexistent/cache.json"), None));
    }

    #[test]
    fn fresh_file_is_valid_and_old_file_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry.json");
        fs::write(&path, b"{}").unwrap();
        assert!(is_file_valid(&path, Some(1)));

        let two_days_ago = SystemTime::now() - Duration::from_secs(2 * 86_400 + 60);
        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(two_days_ago).unwrap();
        drop(file);

        assert!(!is_file_valid(&path, Some(1)));
        assert!(is_file_valid(&path, Some(3)));
        assert!(is_file_valid(&path, None));
    }

    #[test]
    fn safe_remove_deletes_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("victim.json");
        fs::write(&target, b"{}").unwrap();
        assert!(safe_remove(&target, dir.path()));
        assert!(!target.exists());
    }

    #[test]
    fn safe_remove_is_true_for_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        assert!(safe_remove(&dir.path().join("never-existed.json"), dir.path()));
    }

    #[test]
    fn safe_remove_refuses_outside_root() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("secret.json");
        fs::write(&target, b"{}").unwrap();

        assert!(!safe_remove(&target, root.path()));
        assert!(target.exists());
    }

    #[test]
    fn safe_remove_refuses_traversal_out_of_root() {
        let outside = tempfile::tempdir().unwrap();
        let root = outside.path().join("dataset");
        fs::create_dir_all(root.join("cache")).unwrap();
        let target = outside.path().join("escape.json");
        fs::write(&target, b"{}").unwrap();

        let sneaky = root.join("cache").join("..").join("..").join("escape.json");
        assert!(!safe_remove(&sneaky, &root));
        assert!(target.exists());
    }

    #[test]
    fn safe_remove_resolves_symlinks_before_checking() {
        #[cfg(unix)]
        {
            let root = tempfile::tempdir().unwrap();
            let outside = tempfile::tempdir().unwrap();
            let target = outside.path().join("secret.json");
            fs::write(&target, b"{}").unwrap();
            let link = root.path().join("link.json");
            std::os::unix::fs::symlink(&target, &link).unwrap();

            assert!(!safe_remove(&link, root.path()));
            assert!(target.exists());
        }
    }
}
