//! Removal of locally derived files after a teardown.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use tracing::info;

use crate::error::{DeployError, StateError};

/// Remove each path (file or directory tree), skipping ones that do not exist.
///
/// Returns the paths that were actually removed.
///
/// # Errors
///
/// Returns `StateError::Io` for the first path that exists but cannot be
/// removed.
pub fn remove_local_artifacts(paths: &[Utf8PathBuf]) -> Result<Vec<Utf8PathBuf>, DeployError> {
    let mut removed = Vec::new();
    for path in paths {
        if remove_one(path)? {
            info!(path = %path, "removed local artifact");
            removed.push(path.clone());
        }
    }
    Ok(removed)
}

fn remove_one(path: &Utf8Path) -> Result<bool, DeployError> {
    let Some(name) = path.file_name() else {
        return Ok(false);
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };

    let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(io_error(path, &e)),
    };

    let metadata = match dir.symlink_metadata(name) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(io_error(path, &e)),
    };

    let result = if metadata.is_dir() {
        dir.remove_dir_all(name)
    } else {
        dir.remove_file(name)
    };
    result.map_err(|e| io_error(path, &e))?;
    Ok(true)
}

fn io_error(path: &Utf8Path, error: &std::io::Error) -> DeployError {
    StateError::Io {
        path: path.as_std_path().to_path_buf(),
        message: error.to_string(),
    }
    .into()
}
