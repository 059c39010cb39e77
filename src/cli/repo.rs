use std::fmt::Write;

use crate::contexts::{Assignment, RepoStatus};

pub fn format_assignment(assignment: &Assignment) -> String {
    match (&assignment.replaced, assignment.changed) {
        (_, false) => format!(
            "ℹ️  {} is already assigned to context '{}'",
            assignment.root.display(),
            assignment.context_name
        ),
        (Some(previous), true) => format!(
            "✅ {} reassigned from context '{}' to '{}'",
            assignment.root.display(),
            previous,
            assignment.context_name
        ),
        (None, true) => format!(
            "✅ {} assigned to context '{}'",
            assignment.root.display(),
            assignment.context_name
        ),
    }
}

pub fn format_repo_status(status: &RepoStatus) -> String {
    match status {
        RepoStatus::NotARepository(dir) => {
            format!("{} is not inside a git repository.", dir.display())
        }
        RepoStatus::Unassigned { root } => format!(
            "No context is assigned to the repository at {}\nGit operations use your global or system git configuration.",
            root.display()
        ),
        RepoStatus::Assigned { root, context } => {
            let mut output = format!("Repository: {}\nContext: {}", root.display(), context.name);
            if context.has_custom_username() {
                let _ = write!(output, "\n  Username: {}", context.username);
            }
            if !context.email.is_empty() {
                let _ = write!(output, "\n  Email: {}", context.email);
            }
            output
        }
        RepoStatus::Dangling { root, context_name } => format!(
            "Repository: {}\nContext: {}\n⚠️  Context '{}' is assigned but not defined. Git runs without it.",
            root.display(),
            context_name,
            context_name
        ),
    }
}
