mod context;
mod git;
mod interactive;
mod repo;

pub use context::{format_added, format_context_table, format_removal};
pub use git::{GIT_USAGE, run_git};
pub use interactive::{prompt_optional, prompt_token};
pub use repo::{format_assignment, format_repo_status};
