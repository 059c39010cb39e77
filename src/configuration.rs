use etcetera::BaseStrategy;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::utils::{CONFIG_ENV, EnvProvider, non_empty_var};

/// Username recorded for contexts created without one. Hosts that accept
/// tokens as passwords ignore this name, and it never overrides `user.name`.
pub const DEFAULT_USERNAME: &str = "x-access-token";

const APP_DIR: &str = "gham";
const CONFIG_FILE_NAME: &str = "config.yaml";

/// A named identity. The token for a context lives in the secret store only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
}

impl Context {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            username: String::new(),
            email: String::new(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Whether the username should be applied as the commit author name.
    pub fn has_custom_username(&self) -> bool {
        !self.username.is_empty() && self.username != DEFAULT_USERNAME
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoAssignment {
    pub path: PathBuf,
    pub context_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub contexts: Vec<Context>,
    pub repositories: Vec<RepoAssignment>,
}

/// The persisted configuration document plus the path it was loaded from.
///
/// Mutations only touch memory; callers decide when to [`ContextStore::save`].
#[derive(Debug, Clone)]
pub struct ContextStore {
    path: PathBuf,
    config: AppConfig,
}

impl ContextStore {
    /// Loads the document at `path`. A missing file is an empty configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();

        if !path.exists() {
            log::debug!(
                "No configuration at {}. Starting with an empty one",
                path.display()
            );
            return Ok(Self {
                path: path.to_path_buf(),
                config: AppConfig::default(),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigurationError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = if content.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(&content).map_err(|e| ConfigurationError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?
        };

        log::debug!(
            "Loaded {} contexts and {} repository assignments from {}",
            config.contexts.len(),
            config.repositories.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// Resolves the configuration path (`explicit`, then `GHAM_CONFIG`, then the
    /// platform config directory) and loads it.
    pub fn load_default(
        explicit: Option<PathBuf>,
        env: &impl EnvProvider,
    ) -> Result<Self, ConfigurationError> {
        let path = determine_config_path(explicit, env)?;
        Self::load(path)
    }

    /// Replaces the whole document on disk. The file is only readable by its owner.
    pub fn save(&self) -> Result<(), ConfigurationError> {
        let write_err = |source: std::io::Error| ConfigurationError::Write {
            path: self.path.clone(),
            source,
        };

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(write_err)?;

        let content = serde_yaml::to_string(&self.config)?;

        let mut file = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
        file.write_all(content.as_bytes()).map_err(write_err)?;
        file.flush().map_err(write_err)?;
        restrict_permissions(file.path()).map_err(write_err)?;
        file.persist(&self.path).map_err(|e| write_err(e.error))?;

        log::debug!("Saved configuration to {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn contexts(&self) -> &[Context] {
        &self.config.contexts
    }

    pub fn assignments(&self) -> &[RepoAssignment] {
        &self.config.repositories
    }

    pub fn find_context(&self, name: &str) -> Option<&Context> {
        self.config.contexts.iter().find(|c| c.name == name)
    }

    /// Name of the context assigned to `root`, if any.
    pub fn get_assignment(&self, root: &Path) -> Option<&str> {
        self.config
            .repositories
            .iter()
            .find(|r| r.path == root)
            .map(|r| r.context_name.as_str())
    }

    /// Adds `context`, trimming its fields and applying [`DEFAULT_USERNAME`]
    /// when no username was given. Returns the stored record.
    pub fn add_context(&mut self, context: Context) -> Result<&Context, ContextError> {
        let name = context.name.trim().to_string();
        if name.is_empty() {
            return Err(ContextError::EmptyName);
        }
        if self.find_context(&name).is_some() {
            return Err(ContextError::AlreadyExists(name));
        }

        let username = match context.username.trim() {
            "" => DEFAULT_USERNAME.to_string(),
            username => username.to_string(),
        };

        self.config.contexts.push(Context {
            name,
            username,
            email: context.email.trim().to_string(),
        });

        let added = self.config.contexts.len() - 1;
        Ok(&self.config.contexts[added])
    }

    /// Removes a context and every repository assignment that points at it.
    pub fn remove_context(&mut self, name: &str) -> bool {
        let before = self.config.contexts.len();
        self.config.contexts.retain(|c| c.name != name);
        if self.config.contexts.len() == before {
            return false;
        }

        let assignments = self.config.repositories.len();
        self.config.repositories.retain(|r| r.context_name != name);
        log::debug!(
            "Removed context '{}' and {} repository assignments",
            name,
            assignments - self.config.repositories.len()
        );
        true
    }

    /// Binds `root` to `context_name`, replacing any previous binding for the
    /// same root. Returns `false` when the identical binding already existed.
    pub fn assign_repo_context(&mut self, root: &Path, context_name: &str) -> bool {
        match self
            .config
            .repositories
            .iter_mut()
            .find(|r| r.path == root)
        {
            Some(existing) if existing.context_name == context_name => false,
            Some(existing) => {
                log::debug!(
                    "Reassigning {} from '{}' to '{}'",
                    root.display(),
                    existing.context_name,
                    context_name
                );
                existing.context_name = context_name.to_string();
                true
            }
            None => {
                self.config.repositories.push(RepoAssignment {
                    path: root.to_path_buf(),
                    context_name: context_name.to_string(),
                });
                true
            }
        }
    }
}

pub fn determine_config_path(
    explicit: Option<PathBuf>,
    env: &impl EnvProvider,
) -> Result<PathBuf, ConfigurationError> {
    if let Some(path) = explicit {
        return Ok(path);
    }

    if let Some(path) = non_empty_var(env, CONFIG_ENV) {
        log::debug!("Using configuration path from {CONFIG_ENV}: {path}");
        return Ok(PathBuf::from(path));
    }

    let strategy = etcetera::choose_base_strategy()?;
    Ok(strategy.config_dir().join(APP_DIR).join(CONFIG_FILE_NAME))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Failed to read configuration {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse configuration {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Failed to write configuration {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] serde_yaml::Error),
    #[error("Could not determine the configuration directory: {0}")]
    NoConfigDir(#[from] etcetera::HomeDirError),
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Context name cannot be empty")]
    EmptyName,
    #[error("Context '{0}' already exists")]
    AlreadyExists(String),
    #[error("Context '{0}' not found")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MockEnvProvider;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ContextStore {
        ContextStore::load(dir.path().join("gham").join(CONFIG_FILE_NAME)).unwrap()
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        assert!(store.contexts().is_empty());
        assert!(store.assignments().is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        store
            .add_context(Context::new("work").with_username("alice").with_email("alice@example.com"))
            .unwrap();
        store.assign_repo_context(Path::new("/repos/project"), "work");
        store.save().unwrap();

        let reloaded = ContextStore::load(store.path()).unwrap();
        assert_eq!(reloaded.config(), store.config());
        assert_eq!(
            reloaded.get_assignment(Path::new("/repos/project")),
            Some("work")
        );
    }

    #[test]
    fn test_document_shape() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        store
            .add_context(Context::new("work").with_username("alice").with_email("alice@example.com"))
            .unwrap();
        store.add_context(Context::new("home")).unwrap();
        store.assign_repo_context(Path::new("/repos/project"), "work");
        store.save().unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        insta::assert_snapshot!(content, @r"
contexts:
- name: work
  username: alice
  email: alice@example.com
- name: home
  username: x-access-token
repositories:
- path: /repos/project
  contextName: work
");
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        store.add_context(Context::new("work")).unwrap();
        store.save().unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "contexts: [unclosed").unwrap();

        let result = ContextStore::load(&path);
        assert!(matches!(result, Err(ConfigurationError::Parse { .. })));
    }

    #[test]
    fn test_add_context_applies_default_username() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);

        let added = store.add_context(Context::new("  home ")).unwrap();
        assert_eq!(added.name, "home");
        assert_eq!(added.username, DEFAULT_USERNAME);
        assert!(!added.has_custom_username());
    }

    #[test]
    fn test_add_context_rejects_duplicates_and_blank_names() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        store.add_context(Context::new("work")).unwrap();

        assert!(matches!(
            store.add_context(Context::new("work").with_username("bob")),
            Err(ContextError::AlreadyExists(name)) if name == "work"
        ));
        assert!(matches!(
            store.add_context(Context::new("   ")),
            Err(ContextError::EmptyName)
        ));
        assert_eq!(store.contexts().len(), 1);
    }

    #[test]
    fn test_remove_context_cascades_assignments() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        store.add_context(Context::new("work")).unwrap();
        store.add_context(Context::new("home")).unwrap();
        store.assign_repo_context(Path::new("/repos/a"), "work");
        store.assign_repo_context(Path::new("/repos/b"), "work");
        store.assign_repo_context(Path::new("/repos/c"), "home");

        assert!(store.remove_context("work"));
        assert!(!store.remove_context("work"));

        assert!(store.find_context("work").is_none());
        assert!(store.assignments().iter().all(|r| r.context_name != "work"));
        assert_eq!(store.get_assignment(Path::new("/repos/c")), Some("home"));
    }

    #[test]
    fn test_assign_repo_context_upserts() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        let root = Path::new("/repos/project");

        assert!(store.assign_repo_context(root, "work"));
        assert_eq!(store.get_assignment(root), Some("work"));

        assert!(!store.assign_repo_context(root, "work"));
        assert!(store.assign_repo_context(root, "home"));

        let for_root: Vec<_> = store
            .assignments()
            .iter()
            .filter(|r| r.path == root)
            .collect();
        assert_eq!(for_root.len(), 1);
        assert_eq!(store.get_assignment(root), Some("home"));
    }

    #[test]
    fn test_dangling_assignment_loads() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "contexts: []\nrepositories:\n- path: /repos/project\n  contextName: ghost\n",
        )
        .unwrap();

        let store = ContextStore::load(&path).unwrap();
        assert_eq!(store.get_assignment(Path::new("/repos/project")), Some("ghost"));
        assert!(store.find_context("ghost").is_none());
    }

    #[test]
    fn test_config_path_from_env() {
        let mut mock_env = MockEnvProvider::new();
        mock_env
            .expect_var()
            .with(mockall::predicate::eq(CONFIG_ENV))
            .times(1)
            .returning(|_| Ok("/custom/gham.yaml".to_string()));

        let path = determine_config_path(None, &mock_env).unwrap();
        assert_eq!(path, PathBuf::from("/custom/gham.yaml"));
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let mock_env = MockEnvProvider::new();

        let path = determine_config_path(Some(PathBuf::from("/explicit.yaml")), &mock_env).unwrap();
        assert_eq!(path, PathBuf::from("/explicit.yaml"));
    }
}
