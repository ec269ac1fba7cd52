//! Host directories mounted into the services.
//!
//! Directories are opened up to mode 0777 so container users with arbitrary
//! uids can write to them. This is a local development posture.
use crate::error::BootstrapError;
use serde::Serialize;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const SHARED_MODE: u32 = 0o777;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryReport {
    pub created: Vec<PathBuf>,
    pub already_present: Vec<PathBuf>,
}

/// Create every path (with parents) and make it world-writable.
///
/// Existing directories that already carry the mode are left untouched.
pub fn ensure(paths: &[PathBuf]) -> Result<DirectoryReport, BootstrapError> {
    let mut report = DirectoryReport::default();
    for path in paths {
        let existed = path.is_dir();
        if !existed {
            fs::create_dir_all(path).map_err(|source| filesystem(path, source))?;
        }
        open_permissions(path)?;
        if existed {
            tracing::debug!(path = %path.display(), "directory present");
            report.already_present.push(path.clone());
        } else {
            tracing::info!(path = %path.display(), "created directory");
            report.created.push(path.clone());
        }
    }
    Ok(report)
}

fn open_permissions(path: &Path) -> Result<(), BootstrapError> {
    let metadata = fs::metadata(path).map_err(|source| filesystem(path, source))?;
    let mut permissions = metadata.permissions();
    if permissions.mode() & 0o777 == SHARED_MODE {
        return Ok(());
    }
    permissions.set_mode(SHARED_MODE);
    fs::set_permissions(path, permissions).map_err(|source| filesystem(path, source))
}

fn filesystem(path: &Path, source: std::io::Error) -> BootstrapError {
    BootstrapError::Filesystem {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(path: &Path) -> u32 {
        fs::metadata(path).expect("stat").permissions().mode() & 0o777
    }

    #[test]
    fn creates_nested_directories_world_writable() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let paths = vec![dir.path().join("data/minio"), dir.path().join("dags")];
        let report = ensure(&paths).expect("ensure directories");
        assert_eq!(report.created, paths);
        assert!(report.already_present.is_empty());
        for path in &paths {
            assert_eq!(mode(path), 0o777);
        }
    }

    #[test]
    fn second_run_is_a_no_op() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("logs");
        ensure(std::slice::from_ref(&path)).expect("first run");
        fs::write(path.join("keep.txt"), "x").expect("write marker");

        let report = ensure(std::slice::from_ref(&path)).expect("second run");
        assert_eq!(report.already_present, vec![path.clone()]);
        assert!(report.created.is_empty());
        assert!(path.join("keep.txt").is_file());
    }

    #[test]
    fn tightened_directory_is_reopened() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("plugins");
        fs::create_dir(&path).expect("mkdir");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o700)).expect("chmod");
        ensure(std::slice::from_ref(&path)).expect("ensure");
        assert_eq!(mode(&path), 0o777);
    }

    #[test]
    fn file_in_the_way_is_a_filesystem_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let blocker = dir.path().join("data");
        fs::write(&blocker, "not a dir").expect("write file");
        let err = ensure(&[blocker.join("postgres")]).expect_err("parent is a file");
        assert!(matches!(err, BootstrapError::Filesystem { .. }));
    }
}
