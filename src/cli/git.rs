use anyhow::Result;
use std::{ffi::OsString, io, path::PathBuf};

use crate::{
    configuration::ContextStore,
    git::GixRemoteReader,
    inject::CredentialInjector,
    runner::{GitProcessRunner, execute, install_interrupt_handler},
    secret::{DEFAULT_BACKENDS, open_secret_store},
    utils::StdEnvProvider,
};

pub const GIT_USAGE: &str = "gham: 'git' requires a git command.
Example: gham git clone https://github.com/user/repo.git
Example: gham git status";

/// Runs `git <args>` with the context of the current repository applied and
/// returns git's exit code.
pub fn run_git(args: &[OsString], config: Option<PathBuf>) -> Result<i32> {
    if args.is_empty() {
        println!("{GIT_USAGE}");
        return Ok(0);
    }

    let env = StdEnvProvider;
    let cwd = std::env::current_dir()?;
    let contexts = ContextStore::load_default(config, &env)?;
    let secrets = open_secret_store(DEFAULT_BACKENDS);
    let remotes = GixRemoteReader;

    let plan = CredentialInjector::new(&contexts, secrets.as_ref(), &remotes).wrap(&cwd, args);
    plan.emit_notices(&mut io::stderr().lock())?;

    let runner = GitProcessRunner::from_env(&env);
    if let Err(e) = install_interrupt_handler(runner.interrupt_flag()) {
        log::debug!("Failed to install interrupt handler: {e}");
    }
    Ok(execute(&plan, &runner)?)
}
