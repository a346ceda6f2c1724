//! Durable storage for the session credential.
//!
//! Production builds keep the bearer token in the OS credential store
//! (Keychain on macOS, DPAPI on Windows, Secret Service on Linux) through
//! the `keyring` crate. Only one key is managed: the token.

use keyring::Entry;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;

const SERVICE_NAME: &str = "delivery-board";

/// Key under which the bearer token is persisted.
pub const KEY_TOKEN: &str = "token";

/// Get/set/clear access to the persisted bearer credential.
pub trait CredentialStore: Send + Sync {
    /// `None` when no credential is stored.
    fn get(&self) -> Option<String>;
    fn set(&self, token: &str) -> Result<()>;
    /// Succeeds when nothing is stored.
    fn clear(&self) -> Result<()>;
}

/// Credential store backed by the OS keyring.
pub struct KeyringStore {
    service: String,
    key: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            key: KEY_TOKEN.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Ok(Entry::new(&self.service, &self.key)?)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self) -> Option<String> {
        let entry = match self.entry() {
            Ok(e) => e,
            Err(e) => {
                warn!(key = %self.key, error = %e, "keyring: failed to create entry");
                return None;
            }
        };
        match entry.get_password() {
            Ok(pw) if !pw.trim().is_empty() => Some(pw),
            Ok(_) => None,
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(key = %self.key, error = %e, "keyring: failed to read credential");
                None
            }
        }
    }

    fn set(&self, token: &str) -> Result<()> {
        self.entry()?.set_password(token)?;
        info!(service = %self.service, "session credential stored");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                info!(service = %self.service, "session credential cleared");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store. Used by tests and by `--ephemeral` runs.
#[derive(Default)]
pub struct MemoryStore {
    token: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }

    fn set(&self, token: &str) -> Result<()> {
        let mut slot = self
            .token
            .lock()
            .map_err(|e| crate::error::Error::Storage(e.to_string()))?;
        *slot = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut slot = self
            .token
            .lock()
            .map_err(|e| crate::error::Error::Storage(e.to_string()))?;
        *slot = None;
        Ok(())
    }
}
