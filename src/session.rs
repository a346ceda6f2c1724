//! Session context.
//!
//! A [`Session`] is created at login (or restored from the credential
//! store at startup) and handed explicitly to every call that needs the
//! bearer token. [`SessionManager`] owns the store and defines the
//! lifecycle: begin, restore, end (logout) and invalidate (the backend
//! rejected the token).

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::storage::CredentialStore;

/// An authenticated session. The token is wiped from memory on drop.
#[derive(Clone)]
pub struct Session {
    token: Zeroizing<String>,
    username: Option<String>,
}

impl Session {
    pub fn new(token: &str) -> Self {
        Self {
            token: Zeroizing::new(token.to_string()),
            username: None,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Handler identity, once resolved from the backend.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_username(&mut self, username: &str) {
        self.username = Some(username.to_string());
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

/// Owns the credential store and the current session, if any.
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    current: Option<Session>,
}

impl SessionManager {
    /// Build a manager and restore any persisted credential.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let current = store.get().map(|token| Session::new(&token));
        Self { store, current }
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut Session> {
        self.current.as_mut()
    }

    /// The current session, or [`Error::NotLoggedIn`].
    pub fn require(&self) -> Result<&Session> {
        self.current.as_ref().ok_or(Error::NotLoggedIn)
    }

    /// Re-read the store; picks up a login made by another process.
    pub fn restore(&mut self) -> Option<&Session> {
        let stored = self.store.get();
        let unchanged = matches!(
            (&self.current, &stored),
            (Some(s), Some(token)) if s.token() == token.as_str()
        );
        if !unchanged {
            self.current = stored.map(|token| Session::new(&token));
        }
        self.current.as_ref()
    }

    /// Persist a freshly issued token and make it the current session.
    pub fn begin(&mut self, token: &str) -> Result<&Session> {
        self.store.set(token)?;
        info!("session started");
        Ok(self.current.insert(Session::new(token)))
    }

    /// Logout: drop the session and clear the stored credential. The
    /// backend is not notified.
    pub fn end(&mut self) -> Result<()> {
        self.current = None;
        self.store.clear()?;
        info!("session ended");
        Ok(())
    }

    /// The backend rejected the token. The stored credential is cleared so
    /// the next call reports "not logged in" instead of failing again.
    pub fn invalidate(&mut self) {
        self.current = None;
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear rejected credential");
        }
        warn!("session invalidated after authorization failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn restores_persisted_token_on_construction() {
        let store = Arc::new(MemoryStore::with_token("persisted"));
        let manager = SessionManager::new(store);
        assert_eq!(
            manager.require().expect("session restored").token(),
            "persisted"
        );
    }

    #[test]
    fn begin_persists_and_end_clears() {
        let store = Arc::new(MemoryStore::new());
        let mut manager = SessionManager::new(store.clone());
        assert!(matches!(manager.require(), Err(Error::NotLoggedIn)));

        manager.begin("fresh").expect("begin session");
        assert_eq!(store.get().as_deref(), Some("fresh"));

        manager.end().expect("end session");
        assert_eq!(store.get(), None);
        assert!(matches!(manager.require(), Err(Error::NotLoggedIn)));
    }

    #[test]
    fn invalidate_clears_store() {
        let store = Arc::new(MemoryStore::with_token("stale"));
        let mut manager = SessionManager::new(store.clone());
        manager.invalidate();
        assert!(manager.current().is_none());
        assert_eq!(store.get(), None);
    }

    #[test]
    fn restore_follows_external_changes() {
        let store = Arc::new(MemoryStore::new());
        let mut manager = SessionManager::new(store.clone());
        assert!(manager.restore().is_none());

        store.set("from-elsewhere").expect("set token");
        assert_eq!(
            manager.restore().map(Session::token),
            Some("from-elsewhere")
        );

        store.clear().expect("clear");
        assert!(manager.restore().is_none());
    }

    #[test]
    fn debug_output_redacts_token() {
        let mut session = Session::new("secret-jwt");
        session.set_username("alice");
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-jwt"));
        assert!(rendered.contains("alice"));
    }
}
