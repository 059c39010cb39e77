use std::{
    io,
    path::{Component, Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum RepoLocateError {
    #[error("Path does not exist: {0:?}")]
    PathMissing(PathBuf),
    #[error("Not a git repository (or any of the parent directories of {0:?})")]
    NotARepository(PathBuf),
    #[error("Failed to resolve path {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Finds the root of the working tree containing `start`.
///
/// `start` is made absolute and, if it names a file, replaced by its directory.
/// The first ancestor holding a `.git` entry wins. A `.git` file (worktree or
/// submodule pointer) counts the same as a `.git` directory.
pub fn find_repo_root(start: &Path) -> Result<PathBuf, RepoLocateError> {
    let absolute = std::path::absolute(start).map_err(|e| RepoLocateError::Io {
        path: start.to_path_buf(),
        source: e,
    })?;
    let absolute = normalize(&absolute);

    let metadata = match absolute.metadata() {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(RepoLocateError::PathMissing(absolute));
        }
        Err(e) => {
            return Err(RepoLocateError::Io {
                path: absolute,
                source: e,
            });
        }
    };

    let start_dir = if metadata.is_dir() {
        absolute.as_path()
    } else {
        absolute.parent().unwrap_or(absolute.as_path())
    };

    for dir in start_dir.ancestors() {
        if dir.join(".git").symlink_metadata().is_ok() {
            log::debug!("Found repository root {}", dir.display());
            return Ok(dir.to_path_buf());
        }
    }

    Err(RepoLocateError::NotARepository(start_dir.to_path_buf()))
}

// Lexically folds `.` and `..` so that walking ancestors follows the path the
// user meant rather than its spelling.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}
