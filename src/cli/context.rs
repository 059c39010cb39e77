use std::fmt::Write;

use crate::{
    configuration::{Context, DEFAULT_USERNAME},
    contexts::{ContextSummary, Removal},
};

const HEADERS: [&str; 5] = ["NAME", "USERNAME", "EMAIL", "REPOS", "TOKEN STORED?"];
const COLUMN_GAP: usize = 3;

fn display_username(context: &Context) -> &str {
    if context.username.is_empty() || context.username == DEFAULT_USERNAME {
        "(default)"
    } else {
        &context.username
    }
}

fn display_email(context: &Context) -> &str {
    if context.email.is_empty() {
        "(not set)"
    } else {
        &context.email
    }
}

/// Renders the context list as an aligned table.
pub fn format_context_table(summaries: &[ContextSummary]) -> String {
    if summaries.is_empty() {
        return "No contexts configured yet. Use 'gham context add <name>' to add one.".to_string();
    }

    let rows: Vec<[String; 5]> = summaries
        .iter()
        .map(|summary| {
            [
                summary.context.name.clone(),
                display_username(&summary.context).to_string(),
                display_email(&summary.context).to_string(),
                summary.repositories.to_string(),
                if summary.token_stored { "Yes" } else { "No / Error" }.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let mut push_row = |cells: [&str; 5]| {
        let mut line = String::new();
        for (i, cell) in cells.iter().enumerate() {
            if i + 1 == cells.len() {
                line.push_str(cell);
            } else {
                let _ = write!(line, "{cell:<width$}", width = widths[i] + COLUMN_GAP);
            }
        }
        output.push_str(line.trim_end());
        output.push('\n');
    };

    push_row(HEADERS);
    push_row(HEADERS.map(|header| &"-----------------"[..header.len()]));
    for row in &rows {
        push_row([&row[0], &row[1], &row[2], &row[3], &row[4]]);
    }

    output.trim_end().to_string()
}

pub fn format_added(context: &Context) -> String {
    format!(
        "✅ Context '{}' added (username: {}, email: {})",
        context.name,
        display_username(context),
        display_email(context)
    )
}

pub fn format_removal(removal: &Removal) -> String {
    let mut output = format!("🗑️  Context '{}' removed", removal.name);
    for path in &removal.unassigned {
        let _ = write!(output, "\n   unassigned {}", path.display());
    }
    output
}
