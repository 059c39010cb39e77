//! Management operations over contexts and repository assignments. Each one
//! mutates the [`ContextStore`], keeps the [`SecretStore`] in step and saves.

use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};

use crate::{
    configuration::{ConfigurationError, Context, ContextError, ContextStore},
    git::{RepoLocateError, find_repo_root},
    secret::{SecretStore, SecretStoreError, token_stored},
};

#[derive(thiserror::Error, Debug)]
pub enum ManageError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Repository(#[from] RepoLocateError),
    #[error("A token is required for context '{0}'")]
    EmptyToken(String),
    #[error("Failed to store the token for context '{name}'; the context was not added: {source}")]
    TokenNotStored {
        name: String,
        #[source]
        source: SecretStoreError,
    },
}

/// Adds `context` and stores `token` for it. When the token cannot be stored
/// the context is removed again, so no identity exists without a secret.
pub fn add_context(
    store: &mut ContextStore,
    secrets: &dyn SecretStore,
    context: Context,
    token: &SecretString,
) -> Result<Context, ManageError> {
    let token = token.expose_secret().trim();
    if token.is_empty() {
        return Err(ManageError::EmptyToken(context.name.trim().to_string()));
    }
    let token = SecretString::from(token.to_string());

    let added = store.add_context(context)?.clone();
    store.save()?;

    if let Err(source) = secrets.store(&added.name, &token) {
        store.remove_context(&added.name);
        if let Err(e) = store.save() {
            log::warn!(
                "Failed to roll back context '{}' after the token was not stored: {e}",
                added.name
            );
        }
        return Err(ManageError::TokenNotStored {
            name: added.name,
            source,
        });
    }

    log::debug!("Added context '{}'", added.name);
    Ok(added)
}

#[derive(Debug)]
pub struct Removal {
    pub name: String,
    pub unassigned: Vec<PathBuf>,
    /// Set when the token could not be deleted. The context is gone regardless.
    pub secret_error: Option<SecretStoreError>,
}

/// Removes a context, its token and every assignment that referenced it.
pub fn remove_context(
    store: &mut ContextStore,
    secrets: &dyn SecretStore,
    name: &str,
) -> Result<Removal, ManageError> {
    if store.find_context(name).is_none() {
        return Err(ContextError::NotFound(name.to_string()).into());
    }

    let unassigned = store
        .assignments()
        .iter()
        .filter(|r| r.context_name == name)
        .map(|r| r.path.clone())
        .collect();

    let secret_error = secrets.delete(name).err();
    if let Some(e) = &secret_error {
        log::debug!("Token for context '{name}' was not deleted: {e}");
    }

    store.remove_context(name);
    store.save()?;

    Ok(Removal {
        name: name.to_string(),
        unassigned,
        secret_error,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub root: PathBuf,
    pub context_name: String,
    /// Context previously bound to the same root, if it differed.
    pub replaced: Option<String>,
    pub changed: bool,
}

/// Binds the repository containing `path` to `context_name`.
pub fn assign(
    store: &mut ContextStore,
    path: &Path,
    context_name: &str,
) -> Result<Assignment, ManageError> {
    let root = find_repo_root(path)?;
    if store.find_context(context_name).is_none() {
        return Err(ContextError::NotFound(context_name.to_string()).into());
    }

    let replaced = store
        .get_assignment(&root)
        .filter(|previous| *previous != context_name)
        .map(str::to_string);
    let changed = store.assign_repo_context(&root, context_name);
    if changed {
        store.save()?;
    }

    Ok(Assignment {
        root,
        context_name: context_name.to_string(),
        replaced,
        changed,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoStatus {
    NotARepository(PathBuf),
    Unassigned { root: PathBuf },
    Assigned { root: PathBuf, context: Context },
    Dangling { root: PathBuf, context_name: String },
}

/// What the wrapper would resolve for `path`, without touching secrets.
pub fn current(store: &ContextStore, path: &Path) -> Result<RepoStatus, ManageError> {
    let root = match find_repo_root(path) {
        Ok(root) => root,
        Err(RepoLocateError::NotARepository(dir)) => return Ok(RepoStatus::NotARepository(dir)),
        Err(e) => return Err(e.into()),
    };

    Ok(match store.get_assignment(&root) {
        None => RepoStatus::Unassigned { root },
        Some(name) => match store.find_context(name) {
            Some(context) => RepoStatus::Assigned {
                context: context.clone(),
                root,
            },
            None => RepoStatus::Dangling {
                context_name: name.to_string(),
                root,
            },
        },
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSummary {
    pub context: Context,
    pub repositories: usize,
    pub token_stored: bool,
}

pub fn list(store: &ContextStore, secrets: &dyn SecretStore) -> Vec<ContextSummary> {
    store
        .contexts()
        .iter()
        .map(|context| ContextSummary {
            repositories: store
                .assignments()
                .iter()
                .filter(|r| r.context_name == context.name)
                .count(),
            token_stored: token_stored(secrets, &context.name),
            context: context.clone(),
        })
        .collect()
}
