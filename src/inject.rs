//! Resolution of the active context for a wrapped git invocation, and the
//! argument rewriting that follows from it.
//!
//! Every resolution step can fail independently. Any failure produces a
//! passthrough plan: the caller's arguments untouched and no `-c` overrides.

use secrecy::{ExposeSecret, SecretString};
use std::{
    ffi::OsString,
    fmt,
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::{
    configuration::{Context, ContextStore, DEFAULT_USERNAME},
    git::{DEFAULT_REMOTE, RemoteReader, find_repo_root, redact_url, remote_host, with_credentials},
    secret::{SecretStore, SecretStoreError},
};

/// Prefix of every diagnostic line written by the wrapper.
pub const DIAGNOSTIC_PREFIX: &str = "gham";

// Global git options whose value is the following argument.
const GLOBAL_OPTIONS_WITH_VALUE: &[&str] = &[
    "-C",
    "-c",
    "--git-dir",
    "--work-tree",
    "--namespace",
    "--config-env",
    "--super-prefix",
    "--attr-source",
];

const CLONE_LONG_OPTIONS_WITH_VALUE: &[&str] = &[
    "--template",
    "--origin",
    "--branch",
    "--revision",
    "--upload-pack",
    "--reference",
    "--reference-if-able",
    "--separate-git-dir",
    "--depth",
    "--shallow-since",
    "--shallow-exclude",
    "--jobs",
    "--config",
    "--filter",
    "--server-option",
    "--bundle-uri",
    "--ref-format",
];

const CLONE_SHORT_OPTIONS_WITH_VALUE: &[&str] = &["-b", "-o", "-u", "-c", "-j"];

/// Outcome of resolving the context for the current directory, in the order
/// the steps are attempted.
#[derive(Debug)]
pub enum Resolution {
    /// The directory is not inside a git working tree.
    OutsideRepo,
    /// Inside a repository that has no context assigned.
    NoAssignment { root: PathBuf },
    /// The assignment names a context that is not defined.
    DanglingAssignment { root: PathBuf, context_name: String },
    /// The context exists but its token could not be read.
    SecretUnavailable {
        root: PathBuf,
        context: Context,
        error: SecretStoreError,
    },
    Active {
        root: PathBuf,
        context: Context,
        token: SecretString,
    },
}

impl Resolution {
    pub fn root(&self) -> Option<&Path> {
        match self {
            Resolution::OutsideRepo => None,
            Resolution::NoAssignment { root }
            | Resolution::DanglingAssignment { root, .. }
            | Resolution::SecretUnavailable { root, .. }
            | Resolution::Active { root, .. } => Some(root),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Resolution::Active { .. })
    }

    /// Short state name, for logging.
    pub fn state(&self) -> &'static str {
        match self {
            Resolution::OutsideRepo => "outside-repo",
            Resolution::NoAssignment { .. } => "no-assignment",
            Resolution::DanglingAssignment { .. } => "dangling-assignment",
            Resolution::SecretUnavailable { .. } => "secret-unavailable",
            Resolution::Active { .. } => "active",
        }
    }
}

/// A `-c key=value` override scoped to one git invocation.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigOverride {
    key: String,
    value: String,
    sensitive: bool,
}

impl ConfigOverride {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            sensitive: false,
        }
    }

    fn sensitive(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            sensitive: true,
            ..Self::new(key, value)
        }
    }

    /// `http.https://<host>/.extraheader` carrying a bearer token.
    pub fn bearer_header(host: &str, token: &SecretString) -> Self {
        Self::sensitive(
            format!("http.https://{host}/.extraheader"),
            format!("Authorization: Bearer {}", token.expose_secret()),
        )
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// The argument that follows `-c`.
    pub fn to_arg(&self) -> OsString {
        OsString::from(format!("{}={}", self.key, self.value))
    }
}

impl fmt::Display for ConfigOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sensitive {
            write!(f, "{}=*****", self.key)
        } else {
            write!(f, "{}={}", self.key, self.value)
        }
    }
}

impl fmt::Debug for ConfigOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigOverride({self})")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Warning(String),
}

/// Everything needed to launch the wrapped git process.
pub struct WrapPlan {
    resolution: Resolution,
    working_dir: PathBuf,
    overrides: Vec<ConfigOverride>,
    args: Vec<OsString>,
    notices: Vec<Notice>,
}

impl WrapPlan {
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn overrides(&self) -> &[ConfigOverride] {
        &self.overrides
    }

    /// The caller's arguments, with the clone URL rewritten when applicable.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn is_passthrough(&self) -> bool {
        !self.resolution.is_active()
    }

    /// The full argument vector for the git binary: overrides, then arguments.
    pub fn command_line(&self) -> Vec<OsString> {
        let mut command_line = Vec::with_capacity(self.overrides.len() * 2 + self.args.len());
        for config in &self.overrides {
            command_line.push(OsString::from("-c"));
            command_line.push(config.to_arg());
        }
        command_line.extend(self.args.iter().cloned());
        command_line
    }

    /// Writes the plan's notices, one per line, to `out`.
    pub fn emit_notices(&self, out: &mut impl Write) -> io::Result<()> {
        for notice in &self.notices {
            match notice {
                Notice::Info(message) => writeln!(out, "{DIAGNOSTIC_PREFIX}: {message}")?,
                Notice::Warning(message) => {
                    writeln!(out, "{DIAGNOSTIC_PREFIX}: warning: {message}")?
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for WrapPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| redact_url(&arg.to_string_lossy()))
            .collect();
        f.debug_struct("WrapPlan")
            .field("resolution", &self.resolution.state())
            .field("working_dir", &self.working_dir)
            .field("overrides", &self.overrides)
            .field("args", &args)
            .field("notices", &self.notices)
            .finish()
    }
}

/// Decides how a git invocation is rewritten for the repository it runs in.
pub struct CredentialInjector<'a> {
    contexts: &'a ContextStore,
    secrets: &'a dyn SecretStore,
    remotes: &'a dyn RemoteReader,
}

impl<'a> CredentialInjector<'a> {
    pub fn new(
        contexts: &'a ContextStore,
        secrets: &'a dyn SecretStore,
        remotes: &'a dyn RemoteReader,
    ) -> Self {
        Self {
            contexts,
            secrets,
            remotes,
        }
    }

    /// Resolves the context bound to the repository containing `cwd`.
    pub fn resolve(&self, cwd: &Path) -> Resolution {
        let root = match find_repo_root(cwd) {
            Ok(root) => root,
            Err(e) => {
                log::debug!("No repository for {}: {e}", cwd.display());
                return Resolution::OutsideRepo;
            }
        };

        let Some(context_name) = self.contexts.get_assignment(&root) else {
            log::debug!("No context assigned to {}", root.display());
            return Resolution::NoAssignment { root };
        };

        let Some(context) = self.contexts.find_context(context_name) else {
            return Resolution::DanglingAssignment {
                context_name: context_name.to_string(),
                root,
            };
        };
        let context = context.clone();

        match self.secrets.get(&context.name) {
            Ok(token) => Resolution::Active {
                root,
                context,
                token,
            },
            Err(error) => Resolution::SecretUnavailable {
                root,
                context,
                error,
            },
        }
    }

    /// Builds the plan for running `git <args>` from `cwd`.
    pub fn wrap(&self, cwd: &Path, args: &[OsString]) -> WrapPlan {
        let resolution = self.resolve(cwd);
        log::debug!("Resolved context state: {}", resolution.state());

        let working_dir = resolution
            .root()
            .map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);

        let mut plan = WrapPlan {
            resolution,
            working_dir,
            overrides: Vec::new(),
            args: args.to_vec(),
            notices: Vec::new(),
        };

        match &plan.resolution {
            Resolution::OutsideRepo | Resolution::NoAssignment { .. } => {}
            Resolution::DanglingAssignment { root, context_name } => {
                plan.notices.push(Notice::Warning(format!(
                    "context '{context_name}' is assigned to {} but is not defined; running git without it",
                    root.display()
                )));
            }
            Resolution::SecretUnavailable { context, error, .. } => {
                plan.notices.push(Notice::Warning(format!(
                    "context '{}' is active but its token could not be retrieved: {error}; running git without it",
                    context.name
                )));
            }
            Resolution::Active {
                root,
                context,
                token,
            } => {
                let (overrides, args, notices) =
                    self.inject(root, context, token, &plan.args);
                plan.overrides = overrides;
                plan.args = args;
                plan.notices = notices;
            }
        }

        plan
    }

    fn inject(
        &self,
        root: &Path,
        context: &Context,
        token: &SecretString,
        args: &[OsString],
    ) -> (Vec<ConfigOverride>, Vec<OsString>, Vec<Notice>) {
        let mut overrides = identity_overrides(context);
        let mut args = args.to_vec();
        let mut notices = Vec::new();

        match subcommand(&args) {
            Some((index, "clone")) => {
                if let Some(notice) = rewrite_clone_url(&mut args, index, context, token) {
                    notices.push(notice);
                }
            }
            Some((_, "push" | "pull" | "fetch")) => {
                let host = self
                    .remotes
                    .remote_url(root, DEFAULT_REMOTE)
                    .map_err(|e| e.to_string())
                    .and_then(|url| remote_host(&url).map_err(|e| e.to_string()));

                match host {
                    Ok(host) => {
                        overrides.push(ConfigOverride::bearer_header(&host, token));
                        notices.push(Notice::Info(format!(
                            "using token from context '{}' for {host}",
                            context.name
                        )));
                    }
                    Err(e) => notices.push(Notice::Warning(format!(
                        "could not determine the host of remote '{DEFAULT_REMOTE}': {e}; running git without the token of context '{}'",
                        context.name
                    ))),
                }
            }
            _ => {}
        }

        (overrides, args, notices)
    }
}

fn identity_overrides(context: &Context) -> Vec<ConfigOverride> {
    let mut overrides = Vec::new();
    if context.has_custom_username() {
        overrides.push(ConfigOverride::new("user.name", &context.username));
    }
    if !context.email.is_empty() {
        overrides.push(ConfigOverride::new("user.email", &context.email));
    }
    overrides
}

fn rewrite_clone_url(
    args: &mut [OsString],
    clone_index: usize,
    context: &Context,
    token: &SecretString,
) -> Option<Notice> {
    let url_index = clone_repository_index(args, clone_index)?;
    let url = args[url_index].to_str()?;

    let username = if context.username.is_empty() {
        DEFAULT_USERNAME
    } else {
        context.username.as_str()
    };

    let Some(rewritten) = with_credentials(url, username, token.expose_secret()) else {
        log::debug!("Leaving non-https clone URL untouched: {url}");
        return None;
    };

    let notice = Notice::Info(format!(
        "cloning with context '{}': {}",
        context.name,
        redact_url(&rewritten)
    ));
    args[url_index] = OsString::from(rewritten);
    Some(notice)
}

/// Index and name of the git subcommand, skipping git's own global options.
pub fn subcommand(args: &[OsString]) -> Option<(usize, &str)> {
    let mut index = 0;
    while index < args.len() {
        let arg = args[index].to_str()?;
        if arg == "--" {
            return None;
        }
        if !arg.starts_with('-') {
            return Some((index, arg));
        }
        index += if GLOBAL_OPTIONS_WITH_VALUE.contains(&arg) { 2 } else { 1 };
    }
    None
}

/// Index of the `<repository>` operand of `git clone`.
fn clone_repository_index(args: &[OsString], clone_index: usize) -> Option<usize> {
    let mut index = clone_index + 1;
    while index < args.len() {
        let arg = args[index].to_str()?;
        if arg == "--" {
            return (index + 1 < args.len()).then_some(index + 1);
        }
        if arg.starts_with("--") {
            index += if CLONE_LONG_OPTIONS_WITH_VALUE.contains(&arg) { 2 } else { 1 };
            continue;
        }
        if arg.starts_with('-') && arg.len() > 1 {
            index += if CLONE_SHORT_OPTIONS_WITH_VALUE.contains(&arg) { 2 } else { 1 };
            continue;
        }
        return Some(index);
    }
    None
}
