mod configuration;
mod contexts;
mod git;
mod inject;
mod runner;
mod secret;
pub mod utils;

#[cfg(feature = "cli")]
pub mod cli;

pub use configuration::{
    AppConfig, ConfigurationError, Context, ContextError, ContextStore, DEFAULT_USERNAME,
    RepoAssignment, determine_config_path,
};
pub use contexts::{
    Assignment, ContextSummary, ManageError, Removal, RepoStatus, add_context, assign, current,
    list, remove_context,
};
pub use git::{
    DEFAULT_REMOTE, GixRemoteReader, RemoteError, RemoteReader, RemoteUrlError, RepoLocateError,
    find_repo_root, redact_url, remote_host, with_credentials,
};
pub use inject::{
    ConfigOverride, CredentialInjector, DIAGNOSTIC_PREFIX, Notice, Resolution, WrapPlan,
    subcommand,
};
pub use runner::{
    GitProcessRunner, ProcessRunner, RunError, exit_code, execute, install_interrupt_handler,
};
pub use secret::{
    DEFAULT_BACKENDS, KeyringSecretStore, MemorySecretStore, SecretBackend, SecretStore,
    SecretStoreError, UnavailableSecretStore, open_secret_store, token_stored,
};
