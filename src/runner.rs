use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

#[cfg(test)]
use mockall::automock;

use crate::{
    inject::WrapPlan,
    utils::{EnvProvider, GIT_BIN_ENV, non_empty_var},
};

pub const DEFAULT_GIT_BINARY: &str = "git";

const POLL_INTERVAL: Duration = Duration::from_millis(25);
// Time the child gets to exit on its own after the terminal interrupts us.
pub const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

/// Keeps Ctrl-C and SIGTERM from killing the wrapper before its git child by
/// raising `interrupted` instead. The child sees the same interrupt through
/// the terminal; a [`GitProcessRunner`] watching the flag kills it if it is
/// still running after its grace period, so no git process outlives the wrapper.
pub fn install_interrupt_handler(interrupted: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
}

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("Failed to launch {program:?}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to wait for {program:?}: {source}")]
    Wait {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg_attr(test, automock)]
pub trait ProcessRunner {
    /// Runs the binary with `args` from `working_dir`, inheriting the standard
    /// streams and environment, and returns its exit code.
    fn run(&self, args: &[OsString], working_dir: &Path) -> Result<i32, RunError>;
}

/// Runs a [`WrapPlan`]: overrides first, then the caller's arguments.
pub fn execute(plan: &WrapPlan, runner: &dyn ProcessRunner) -> Result<i32, RunError> {
    log::debug!("Running git in {}: {:?}", plan.working_dir().display(), plan);
    runner.run(&plan.command_line(), plan.working_dir())
}

#[derive(Debug, Clone)]
pub struct GitProcessRunner {
    binary: PathBuf,
    interrupted: Arc<AtomicBool>,
    grace: Duration,
}

impl Default for GitProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_GIT_BINARY)
    }
}

impl GitProcessRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            interrupted: Arc::new(AtomicBool::new(false)),
            grace: INTERRUPT_GRACE,
        }
    }

    /// How long the child may keep running once an interrupt was seen.
    pub fn with_interrupt_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Flag that, once raised, starts the grace period for the running child.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// `git` from `PATH`, unless `GHAM_GIT_BIN` names another binary.
    pub fn from_env(env: &impl EnvProvider) -> Self {
        match non_empty_var(env, GIT_BIN_ENV) {
            Some(binary) => {
                log::debug!("Using git binary from {GIT_BIN_ENV}: {binary}");
                Self::new(binary)
            }
            None => Self::default(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, RunError> {
        let wait_err = |source: io::Error| RunError::Wait {
            program: self.binary.clone(),
            source,
        };
        let mut interrupted_at: Option<Instant> = None;

        loop {
            if let Some(status) = child.try_wait().map_err(wait_err)? {
                return Ok(status);
            }

            if self.interrupted.load(Ordering::SeqCst) {
                let since = *interrupted_at.get_or_insert_with(Instant::now);
                if since.elapsed() >= self.grace {
                    log::debug!("git did not exit after interrupt; killing pid {}", child.id());
                    if let Err(e) = child.kill() {
                        log::debug!("Failed to kill git: {e}");
                    }
                    return child.wait().map_err(wait_err);
                }
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl ProcessRunner for GitProcessRunner {
    fn run(&self, args: &[OsString], working_dir: &Path) -> Result<i32, RunError> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(working_dir)
            .spawn()
            .map_err(|source| RunError::Launch {
                program: self.binary.clone(),
                source,
            })?;

        let status = self.wait(&mut child)?;
        log::debug!("git exited with {status}");
        Ok(exit_code(status))
    }
}

/// The child's exit code, or `128 + signal` when it was killed by a signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{Context, ContextStore};
    use crate::git::MockRemoteReader;
    use crate::inject::CredentialInjector;
    use crate::secret::UnavailableSecretStore;
    use crate::utils::MockEnvProvider;
    use std::fs;

    fn os_args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_git_binary_from_env() {
        let mut mock_env = MockEnvProvider::new();
        mock_env
            .expect_var()
            .with(mockall::predicate::eq(GIT_BIN_ENV))
            .times(1)
            .returning(|_| Ok("/opt/git/bin/git".to_string()));

        let runner = GitProcessRunner::from_env(&mock_env);
        assert_eq!(runner.binary(), Path::new("/opt/git/bin/git"));
    }

    #[test]
    fn test_git_binary_defaults_to_path_lookup() {
        let mut mock_env = MockEnvProvider::new();
        mock_env
            .expect_var()
            .returning(|_| Err(std::env::VarError::NotPresent));

        let runner = GitProcessRunner::from_env(&mock_env);
        assert_eq!(runner.binary(), Path::new(DEFAULT_GIT_BINARY));
    }

    #[test]
    fn test_missing_binary_is_a_launch_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let runner = GitProcessRunner::new(temp_dir.path().join("no-such-git"));

        let result = runner.run(&os_args(&["status"]), temp_dir.path());
        assert!(matches!(
            result,
            Err(RunError::Launch { source, .. }) if source.kind() == io::ErrorKind::NotFound
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_is_propagated() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let runner = GitProcessRunner::new("sh");

        assert_eq!(runner.run(&os_args(&["-c", "exit 0"]), temp_dir.path()).unwrap(), 0);
        assert_eq!(runner.run(&os_args(&["-c", "exit 7"]), temp_dir.path()).unwrap(), 7);
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_maps_to_128_plus_signal() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let runner = GitProcessRunner::new("sh");

        let code = runner
            .run(&os_args(&["-c", "kill -TERM $$"]), temp_dir.path())
            .unwrap();
        assert_eq!(code, 128 + 15);
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_in_working_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let dir = temp_dir.path().canonicalize().unwrap();
        let runner = GitProcessRunner::new("sh");

        let script = format!("[ \"$(pwd -P)\" = \"{}\" ]", dir.display());
        assert_eq!(runner.run(&os_args(&["-c", &script]), &dir).unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_arguments_are_passed_unchanged() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let runner = GitProcessRunner::new("sh");

        // $0 is the first argument after the script, the rest follow.
        let args = os_args(&[
            "-c",
            "[ \"$0\" = 'a b' ] && [ \"$1\" = '--flag=x y' ] && [ $# -eq 1 ]",
            "a b",
            "--flag=x y",
        ]);
        assert_eq!(runner.run(&args, temp_dir.path()).unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_interrupted_child_is_killed_after_grace() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let runner =
            GitProcessRunner::new("sh").with_interrupt_grace(Duration::from_millis(200));
        runner.interrupt_flag().store(true, Ordering::SeqCst);

        let started = Instant::now();
        let code = runner
            .run(
                &os_args(&["-c", "trap '' INT TERM; exec sleep 30"]),
                temp_dir.path(),
            )
            .unwrap();

        assert_eq!(code, 128 + 9);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_child_exiting_within_grace_keeps_its_code() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let runner = GitProcessRunner::new("sh").with_interrupt_grace(Duration::from_secs(5));
        runner.interrupt_flag().store(true, Ordering::SeqCst);

        let code = runner
            .run(&os_args(&["-c", "sleep 0.1; exit 130"]), temp_dir.path())
            .unwrap();
        assert_eq!(code, 130);
    }

    #[test]
    fn test_push_runs_when_secret_store_fails() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let root = temp_dir.path().join("project");
        fs::create_dir_all(root.join(".git")).unwrap();

        let mut contexts = ContextStore::load(temp_dir.path().join("config.yaml")).unwrap();
        contexts.add_context(Context::new("work")).unwrap();
        contexts.assign_repo_context(&root, "work");
        let secrets = UnavailableSecretStore::new("keyring locked");
        let remotes = MockRemoteReader::new();

        let args = os_args(&["push", "origin", "main"]);
        let plan = CredentialInjector::new(&contexts, &secrets, &remotes).wrap(&root, &args);

        let mut runner = MockProcessRunner::new();
        let expected_args = args.clone();
        let expected_dir = root.clone();
        runner
            .expect_run()
            .withf(move |args, dir| args == expected_args.as_slice() && dir == expected_dir)
            .times(1)
            .returning(|_, _| Ok(42));

        assert_eq!(execute(&plan, &runner).unwrap(), 42);
    }
}
