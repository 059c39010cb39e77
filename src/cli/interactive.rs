use anyhow::Result;
use inquire::{Password, PasswordDisplayMode, Text, validator::Validation};
use secrecy::SecretString;

/// Prompts for a token without echoing it. Empty input is rejected.
pub fn prompt_token(context_name: &str) -> Result<SecretString> {
    let token = Password::new(&format!("🔑 Token for context '{context_name}':"))
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Hidden)
        .with_validator(|input: &str| {
            if input.trim().is_empty() {
                Ok(Validation::Invalid("Token cannot be empty".into()))
            } else {
                Ok(Validation::Valid)
            }
        })
        .prompt()
        .map_err(|e| anyhow::anyhow!("Input cancelled: {}", e))?;

    Ok(SecretString::from(token.trim().to_string()))
}

/// Prompts for an optional value; blank input means "not set".
pub fn prompt_optional(message: &str, help: &str) -> Result<String> {
    let value = Text::new(message)
        .with_help_message(help)
        .prompt()
        .map_err(|e| anyhow::anyhow!("Input cancelled: {}", e))?;

    Ok(value.trim().to_string())
}
