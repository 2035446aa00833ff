//! Durable session state: the bearer token and the logged-in user.
//!
//! The two entries are always written and cleared together. The user entry
//! holds the JSON text exactly as the login endpoint returned it.

mod file;
mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

use thiserror::Error;
use tracing::warn;

use crate::models::{Session, User};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to access session file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid session data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No config directory available for the session file")]
    NoConfigDir,
}

/// Storage for the `access_token` / `user` pair.
///
/// Implementations synchronize internally; the client shares one store
/// behind an `Arc` across concurrent calls.
pub trait SessionStore: Send + Sync {
    fn load_token(&self) -> Option<String>;

    /// The user entry as stored (raw JSON text)
    fn load_user(&self) -> Option<String>;

    /// Replace both entries
    fn persist(&self, token: &str, user_json: &str) -> Result<(), SessionError>;

    /// Remove both entries. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), SessionError>;
}

/// Reconstruct the session from a store.
///
/// A token without a parseable user is not a session.
pub fn load_session(store: &dyn SessionStore) -> Option<Session> {
    let token = store.load_token()?;
    let raw = store.load_user()?;

    match serde_json::from_str::<User>(&raw) {
        Ok(user) => Some(Session { token, user }),
        Err(e) => {
            warn!(error = %e, "Stored user record is unreadable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_session_requires_both_entries() {
        let store = MemorySessionStore::new();
        assert!(load_session(&store).is_none());

        store
            .persist("t1", r#"{"id":"1","email":"a@b.co","name":"A","role":"admin"}"#)
            .unwrap();
        let session = load_session(&store).unwrap();
        assert_eq!(session.token, "t1");
        assert!(session.is_admin());
    }

    #[test]
    fn test_load_session_rejects_garbage_user() {
        let store = MemorySessionStore::new();
        store.persist("t1", "not json").unwrap();
        assert_eq!(store.load_token().as_deref(), Some("t1"));
        assert!(load_session(&store).is_none());
    }
}
