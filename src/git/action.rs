use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;

pub const DEFAULT_REMOTE: &str = "origin";

/// Read-only access to a repository's configured remotes.
#[cfg_attr(test, automock)]
pub trait RemoteReader {
    /// The fetch URL of `remote` in the repository at `repo_root`.
    fn remote_url(&self, repo_root: &Path, remote: &str) -> Result<String, RemoteError>;
}

#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    #[error("Failed to open repository {0:?}")]
    RepoOpen(PathBuf, #[source] Box<gix::open::Error>),
    #[error("Remote '{0}' not found: {1}")]
    RemoteNotFound(String, #[source] Box<gix::remote::find::existing::Error>),
    #[error("Remote '{0}' has no URL configured")]
    NoRemoteUrl(String),
}

/// [`RemoteReader`] backed by gix. Opening the repository only reads its
/// configuration, nothing is written back.
#[derive(Debug, Clone, Default)]
pub struct GixRemoteReader;

impl RemoteReader for GixRemoteReader {
    fn remote_url(&self, repo_root: &Path, remote: &str) -> Result<String, RemoteError> {
        let repository = gix::open(repo_root)
            .map_err(|e| RemoteError::RepoOpen(repo_root.to_path_buf(), Box::new(e)))?;

        let found = repository
            .find_remote(remote)
            .map_err(|e| RemoteError::RemoteNotFound(remote.to_string(), Box::new(e)))?;

        let url = found
            .url(gix::remote::Direction::Fetch)
            .ok_or_else(|| RemoteError::NoRemoteUrl(remote.to_string()))?
            .to_bstring()
            .to_string();
        log::debug!("Remote '{}' of {} is {}", remote, repo_root.display(), crate::git::redact_url(&url));

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn init_repo(dir: &Path, extra_config: &str) {
        let git_dir = dir.join(".git");
        fs::create_dir_all(git_dir.join("objects")).unwrap();
        fs::create_dir_all(git_dir.join("refs").join("heads")).unwrap();
        fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::write(
            git_dir.join("config"),
            format!(
                "[core]\n\trepositoryformatversion = 0\n\tbare = false\n{extra_config}"
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_reads_origin_url() {
        let temp_dir = TempDir::new().unwrap();
        init_repo(
            temp_dir.path(),
            "[remote \"origin\"]\n\turl = https://github.com/owner/repo.git\n\tfetch = +refs/heads/*:refs/remotes/origin/*\n",
        );

        let url = GixRemoteReader
            .remote_url(temp_dir.path(), DEFAULT_REMOTE)
            .unwrap();
        assert_eq!(url, "https://github.com/owner/repo.git");

        // Reading must not touch the repository configuration.
        let config = fs::read_to_string(temp_dir.path().join(".git").join("config")).unwrap();
        assert!(!config.contains("extraheader"));
    }

    #[test]
    fn test_missing_remote() {
        let temp_dir = TempDir::new().unwrap();
        init_repo(temp_dir.path(), "");

        let result = GixRemoteReader.remote_url(temp_dir.path(), DEFAULT_REMOTE);
        assert!(matches!(result, Err(RemoteError::RemoteNotFound(..))));
    }

    #[test]
    fn test_not_a_repository() {
        let temp_dir = TempDir::new().unwrap();

        let result = GixRemoteReader.remote_url(temp_dir.path(), DEFAULT_REMOTE);
        assert!(matches!(result, Err(RemoteError::RepoOpen(..))));
    }
}
