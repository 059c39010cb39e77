//! Per-context token storage.
//!
//! Tokens never live in the configuration document. They are kept by a
//! [`SecretStore`] backend chosen once at startup: the OS keyring when it can
//! be reached, otherwise a store that fails every call so that callers fall
//! back to plain git.

use keyring::credential::CredentialPersistence;
use secrecy::{ExposeSecret, SecretString};
use std::{collections::HashMap, fmt, sync::Mutex};

#[cfg(test)]
use mockall::automock;

/// Service name under which tokens are filed in the OS keyring.
pub const KEYRING_SERVICE: &str = "gham";

// Account used to check that the keyring answers at all.
const PROBE_ACCOUNT: &str = "gham-availability-probe";

/// Backends in the order [`open_secret_store`] tries them by default.
pub const DEFAULT_BACKENDS: &[SecretBackend] = &[SecretBackend::Keyring];

#[cfg_attr(test, automock)]
pub trait SecretStore {
    /// Stores or replaces the token for `name`.
    fn store(&self, name: &str, secret: &SecretString) -> Result<(), SecretStoreError>;

    /// Fetches the token for `name`. A missing token is [`SecretStoreError::NotFound`].
    fn get(&self, name: &str) -> Result<SecretString, SecretStoreError>;

    /// Deletes the token for `name`. Deleting a missing token succeeds.
    fn delete(&self, name: &str) -> Result<(), SecretStoreError>;

    fn backend(&self) -> SecretBackend;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretBackend {
    Keyring,
    Memory,
    Unavailable,
}

impl fmt::Display for SecretBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretBackend::Keyring => write!(f, "keyring"),
            SecretBackend::Memory => write!(f, "memory"),
            SecretBackend::Unavailable => write!(f, "unavailable"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SecretStoreError {
    #[error("Secret store is unavailable: {0}")]
    Unavailable(String),
    #[error("No token stored for context '{0}'")]
    NotFound(String),
    #[error("Secret store failed for context '{name}': {source}")]
    Backend {
        name: String,
        #[source]
        source: keyring::Error,
    },
}

/// Tries each backend in `preference` order and adopts the first that
/// initialises. When none does, the returned store reports every failure.
pub fn open_secret_store(preference: &[SecretBackend]) -> Box<dyn SecretStore> {
    let mut failures = Vec::new();

    for backend in preference {
        match backend {
            SecretBackend::Keyring => match KeyringSecretStore::open(KEYRING_SERVICE) {
                Ok(store) => {
                    log::debug!("Using keyring secret store");
                    return Box::new(store);
                }
                Err(e) => {
                    log::debug!("Keyring secret store rejected: {e}");
                    failures.push(format!("keyring: {e}"));
                }
            },
            SecretBackend::Memory => {
                log::debug!("Using in-memory secret store");
                return Box::new(MemorySecretStore::default());
            }
            SecretBackend::Unavailable => break,
        }
    }

    let reason = if failures.is_empty() {
        "no secret store backend configured".to_string()
    } else {
        failures.join("; ")
    };
    Box::new(UnavailableSecretStore::new(reason))
}

/// Whether a token can currently be read for `name`.
pub fn token_stored(store: &dyn SecretStore, name: &str) -> bool {
    store.get(name).is_ok()
}

/// OS keyring (Keychain, Credential Manager, kernel keyutils) via the `keyring` crate.
#[derive(Debug, Clone)]
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    pub fn open(service: &str) -> Result<Self, SecretStoreError> {
        log::debug!(
            "Keyring persistence: {}",
            match keyring_persistence() {
                CredentialPersistence::EntryOnly => "entry only",
                CredentialPersistence::ProcessOnly => "process only",
                CredentialPersistence::UntilReboot => "until reboot",
                CredentialPersistence::UntilDelete => "until delete",
                _ => "unknown",
            }
        );
        let probe = keyring::Entry::new(service, PROBE_ACCOUNT)
            .map_err(|e| SecretStoreError::Unavailable(e.to_string()))?;

        match probe.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(Self {
                service: service.to_string(),
            }),
            Err(e) => Err(SecretStoreError::Unavailable(e.to_string())),
        }
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry, SecretStoreError> {
        keyring::Entry::new(&self.service, name).map_err(|e| classify(name, e))
    }
}

/// How long the platform keyring keeps what [`KeyringSecretStore`] writes.
pub fn keyring_persistence() -> CredentialPersistence {
    keyring::default::default_credential_builder().persistence()
}

fn classify(name: &str, error: keyring::Error) -> SecretStoreError {
    match error {
        keyring::Error::NoEntry => SecretStoreError::NotFound(name.to_string()),
        keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
            SecretStoreError::Unavailable(error.to_string())
        }
        source => SecretStoreError::Backend {
            name: name.to_string(),
            source,
        },
    }
}

impl SecretStore for KeyringSecretStore {
    fn store(&self, name: &str, secret: &SecretString) -> Result<(), SecretStoreError> {
        self.entry(name)?
            .set_password(secret.expose_secret())
            .map_err(|e| classify(name, e))
    }

    fn get(&self, name: &str) -> Result<SecretString, SecretStoreError> {
        self.entry(name)?
            .get_password()
            .map(SecretString::from)
            .map_err(|e| classify(name, e))
    }

    fn delete(&self, name: &str) -> Result<(), SecretStoreError> {
        match self.entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(classify(name, e)),
        }
    }

    fn backend(&self) -> SecretBackend {
        SecretBackend::Keyring
    }
}

/// Process-local store. Nothing survives the process.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, SecretString>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn store(&self, name: &str, secret: &SecretString) -> Result<(), SecretStoreError> {
        let mut secrets = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
        secrets.insert(
            name.to_string(),
            SecretString::from(secret.expose_secret().to_string()),
        );
        Ok(())
    }

    fn get(&self, name: &str) -> Result<SecretString, SecretStoreError> {
        let secrets = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
        secrets
            .get(name)
            .map(|secret| SecretString::from(secret.expose_secret().to_string()))
            .ok_or_else(|| SecretStoreError::NotFound(name.to_string()))
    }

    fn delete(&self, name: &str) -> Result<(), SecretStoreError> {
        let mut secrets = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
        secrets.remove(name);
        Ok(())
    }

    fn backend(&self) -> SecretBackend {
        SecretBackend::Memory
    }
}

/// Stand-in adopted when no backend initialises. Every call fails the same way.
#[derive(Debug, Clone)]
pub struct UnavailableSecretStore {
    reason: String,
}

impl UnavailableSecretStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn error(&self) -> SecretStoreError {
        SecretStoreError::Unavailable(self.reason.clone())
    }
}

impl SecretStore for UnavailableSecretStore {
    fn store(&self, _name: &str, _secret: &SecretString) -> Result<(), SecretStoreError> {
        Err(self.error())
    }

    fn get(&self, _name: &str) -> Result<SecretString, SecretStoreError> {
        Err(self.error())
    }

    fn delete(&self, _name: &str) -> Result<(), SecretStoreError> {
        Err(self.error())
    }

    fn backend(&self) -> SecretBackend {
        SecretBackend::Unavailable
    }
}
