use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::{ffi::OsString, path::PathBuf, process::ExitCode};

use gham::cli::{
    format_added, format_assignment, format_context_table, format_removal,
    format_repo_status, prompt_optional, prompt_token, run_git,
};
use gham::utils::{LOG_ENV, StdEnvProvider};
use gham::{
    Context, ContextStore, DEFAULT_BACKENDS, DIAGNOSTIC_PREFIX, SecretStore, add_context, assign,
    current, list, open_secret_store, remove_context,
};
use secrecy::SecretString;

#[derive(Parser)]
#[command(author, version, about = "Per-repository git identities and tokens", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage contexts (named identities with a stored token)
    Context {
        #[command(subcommand)]
        context_command: ContextCommands,
    },
    /// Bind repositories to contexts
    Repo {
        #[command(subcommand)]
        repo_command: RepoCommands,
    },
    /// Run git with the context of the current repository
    Git {
        /// Arguments passed to git unchanged
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },
    /// Print the version
    Version,
}

#[derive(Subcommand)]
enum ContextCommands {
    /// Add a new context (prompts for missing values)
    Add {
        /// Name of the context
        name: String,

        /// Access token (will prompt if not provided)
        #[arg(short, long)]
        token: Option<String>,

        /// Commit email for repositories using this context
        #[arg(short, long)]
        email: Option<String>,

        /// Username for commits and https clones
        #[arg(short, long)]
        username: Option<String>,
    },
    /// List contexts
    #[command(alias = "ls")]
    List,
    /// Remove a context, its token and its repository assignments
    #[command(alias = "rm")]
    Remove {
        /// Name of the context
        name: String,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Assign a context to the repository containing PATH
    Assign {
        /// Name of the context
        context: String,

        /// Path inside the repository
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Show the context assigned to the repository containing PATH
    Current {
        /// Path inside the repository
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let args: Vec<OsString> = std::env::args_os().collect();

    // `gham git ...` bypasses clap so git's own flags reach git untouched.
    if args.get(1).is_some_and(|arg| arg == "git") {
        init_git_logging();
        return exit_with(run_git(&args[2..], None));
    }

    let cli = Cli::parse();

    let log_level = cli.verbose.log_level_filter();
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Off) // Turn off all logs by default
        .filter(Some("gham"), log_level)
        .init();

    exit_with(run(cli))
}

fn exit_with(result: Result<i32>) -> ExitCode {
    match result {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("{DIAGNOSTIC_PREFIX}: error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

// On the `gham git` path `-v` belongs to git, so the level comes from GHAM_LOG.
fn init_git_logging() {
    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|value| value.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Warn);

    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Off)
        .filter(Some("gham"), level)
        .init();
}

fn run(cli: Cli) -> Result<i32> {
    let env = StdEnvProvider;

    match cli.command {
        Commands::Context { context_command } => {
            let mut store = ContextStore::load_default(cli.config, &env)?;
            let secrets = open_secret_store(DEFAULT_BACKENDS);
            log::debug!("Secret store backend: {}", secrets.backend());

            match context_command {
                ContextCommands::Add {
                    name,
                    token,
                    email,
                    username,
                } => {
                    if store.find_context(name.trim()).is_some() {
                        bail!("Context '{}' already exists", name.trim());
                    }

                    let token = match token {
                        Some(token) => SecretString::from(token.trim().to_string()),
                        None => prompt_token(&name)?,
                    };
                    let email = match email {
                        Some(email) => email,
                        None => prompt_optional(
                            "📧 Commit email (optional):",
                            "Used as user.email in repositories assigned to this context",
                        )?,
                    };
                    let username = match username {
                        Some(username) => username,
                        None => prompt_optional(
                            "👤 Username (optional):",
                            "Leave blank to use the token without a username",
                        )?,
                    };

                    let context = Context::new(name)
                        .with_username(username)
                        .with_email(email);
                    let added = add_context(&mut store, secrets.as_ref(), context, &token)?;
                    println!("{}", format_added(&added));
                }
                ContextCommands::List => {
                    let summaries = list(&store, secrets.as_ref());
                    println!("{}", format_context_table(&summaries));
                }
                ContextCommands::Remove { name } => {
                    let removal = remove_context(&mut store, secrets.as_ref(), &name)?;
                    if let Some(e) = &removal.secret_error {
                        eprintln!(
                            "{DIAGNOSTIC_PREFIX}: warning: the token for '{name}' may still be in the keyring: {e}"
                        );
                    }
                    println!("{}", format_removal(&removal));
                }
            }
        }
        Commands::Repo { repo_command } => match repo_command {
            RepoCommands::Assign { context, path } => {
                let mut store = ContextStore::load_default(cli.config, &env)?;
                let assignment = assign(&mut store, &path, &context)?;
                println!("{}", format_assignment(&assignment));
            }
            RepoCommands::Current { path } => {
                let store = ContextStore::load_default(cli.config, &env)?;
                let status = current(&store, &path)?;
                println!("{}", format_repo_status(&status));
            }
        },
        // Only reached when global options such as `--config` precede `git`.
        Commands::Git { args } => return run_git(&args, cli.config),
        Commands::Version => {
            println!("gham {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(0)
}
