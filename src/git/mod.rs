pub(crate) mod action;
pub(crate) mod helpers;
pub(crate) mod repository;

pub use action::{DEFAULT_REMOTE, GixRemoteReader, RemoteError, RemoteReader};
pub use helpers::{RemoteUrlError, redact_url, remote_host, with_credentials};
pub use repository::{RepoLocateError, find_repo_root};

#[cfg(test)]
pub use action::MockRemoteReader;
