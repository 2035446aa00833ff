use parking_lot::RwLock;

use super::{SessionError, SessionStore};

#[derive(Debug, Default)]
struct Entries {
    token: Option<String>,
    user: Option<String>,
}

/// In-process store for tests and embedding applications
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<Entries>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load_token(&self) -> Option<String> {
        self.entries.read().token.clone()
    }

    fn load_user(&self) -> Option<String> {
        self.entries.read().user.clone()
    }

    fn persist(&self, token: &str, user_json: &str) -> Result<(), SessionError> {
        let mut entries = self.entries.write();
        entries.token = Some(token.to_string());
        entries.user = Some(user_json.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.entries.write() = Entries::default();
        Ok(())
    }
}
