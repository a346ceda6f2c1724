//! Handler login and logout against the backend.
//!
//! Login failures are never told apart to the handler: bad credentials,
//! an unreachable backend and a malformed reply all come back as
//! [`Error::InvalidCredentials`]. The real cause is logged at debug level.

use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::api::{Backend, UserProfile};
use crate::error::{Error, Result};
use crate::session::SessionManager;

/// Authenticate and persist the issued token as the current session.
///
/// Returns the handler profile when the backend included it in the login
/// reply.
pub async fn login<B: Backend + ?Sized>(
    backend: &B,
    sessions: &mut SessionManager,
    identifier: &str,
    password: &str,
) -> Result<Option<UserProfile>> {
    let identifier = identifier.trim();
    if identifier.is_empty() || password.is_empty() {
        debug!("login rejected locally: empty identifier or password");
        return Err(Error::InvalidCredentials);
    }

    let auth = match backend.login(identifier, password).await {
        Ok(a) => a,
        Err(e) => {
            debug!(error = %e, "login failed");
            return Err(Error::InvalidCredentials);
        }
    };

    sessions.begin(&auth.jwt).map_err(|e| {
        debug!(error = %e, "failed to persist session token");
        Error::InvalidCredentials
    })?;

    if let (Some(user), Some(session)) = (&auth.user, sessions.current_mut()) {
        session.set_username(&user.username);
    }
    info!(identifier, "handler logged in");
    Ok(auth.user)
}

/// Clear the stored credential. The backend is not notified.
pub fn logout(sessions: &mut SessionManager) -> Result<()> {
    sessions.end()?;
    info!("handler logged out");
    Ok(())
}

/// Resolve the handler behind the current session.
///
/// A rejected token invalidates the session.
pub async fn whoami<B: Backend + ?Sized>(
    backend: &B,
    sessions: &mut SessionManager,
) -> Result<UserProfile> {
    let token = Zeroizing::new(sessions.require()?.token().to_string());
    match backend.current_user(&token).await {
        Ok(user) => {
            if let Some(session) = sessions.current_mut() {
                session.set_username(&user.username);
            }
            Ok(user)
        }
        Err(e) => {
            if matches!(e, Error::Unauthorized(_)) {
                sessions.invalidate();
            }
            Err(e.during("fetching user"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::{Call, FakeBackend};
    use crate::storage::{CredentialStore, MemoryStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn successful_login_persists_the_token() {
        let backend = FakeBackend::new("alice", vec![]);
        let store = Arc::new(MemoryStore::new());
        let mut sessions = SessionManager::new(store.clone());

        login(&backend, &mut sessions, " alice ", "secret")
            .await
            .expect("login");
        assert_eq!(store.get().as_deref(), Some("jwt-for-alice"));
        assert_eq!(backend.calls(), vec![Call::Login("alice".into())]);
    }

    #[tokio::test]
    async fn every_login_failure_reads_the_same() {
        let backend = FakeBackend::new("alice", vec![]);
        let store = Arc::new(MemoryStore::new());
        let mut sessions = SessionManager::new(store.clone());

        let wrong = login(&backend, &mut sessions, "alice", "nope")
            .await
            .expect_err("wrong password");
        assert_eq!(wrong.to_string(), "Invalid username or email or password");

        let empty = login(&backend, &mut sessions, "", "secret")
            .await
            .expect_err("empty identifier");
        assert!(matches!(empty, Error::InvalidCredentials));
        // The empty identifier never reached the backend.
        assert_eq!(backend.calls().len(), 1);
        assert_eq!(store.get(), None);
    }

    #[tokio::test]
    async fn logout_then_whoami_is_not_logged_in() {
        let backend = FakeBackend::new("alice", vec![]);
        let mut sessions = SessionManager::new(Arc::new(MemoryStore::with_token("jwt")));

        let user = whoami(&backend, &mut sessions).await.expect("whoami");
        assert_eq!(user.username, "alice");
        assert_eq!(
            sessions.current().and_then(|s| s.username()),
            Some("alice")
        );

        logout(&mut sessions).expect("logout");
        let calls = backend.calls().len();
        assert!(matches!(
            whoami(&backend, &mut sessions).await,
            Err(Error::NotLoggedIn)
        ));
        assert_eq!(backend.calls().len(), calls);
    }
}
