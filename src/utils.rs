#[cfg(test)]
use mockall::automock;

/// Overrides the location of the configuration document.
pub const CONFIG_ENV: &str = "GHAM_CONFIG";
/// Overrides the git binary launched by the wrapper.
pub const GIT_BIN_ENV: &str = "GHAM_GIT_BIN";
/// Log filter used on the `gham git` path, where `-v` belongs to git.
pub const LOG_ENV: &str = "GHAM_LOG";

// Trait for environment variable access (mockable in tests)
#[cfg_attr(test, automock)]
pub trait EnvProvider {
    fn var(&self, key: &str) -> Result<String, std::env::VarError>;
}

// Default implementation that uses std::env
#[derive(Debug, Default, Clone, Copy)]
pub struct StdEnvProvider;

impl EnvProvider for StdEnvProvider {
    fn var(&self, key: &str) -> Result<String, std::env::VarError> {
        std::env::var(key)
    }
}

/// Returns the value of `key` when it is set to something other than whitespace.
pub fn non_empty_var(env: &impl EnvProvider, key: &str) -> Option<String> {
    env.var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
