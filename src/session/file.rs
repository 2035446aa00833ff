use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{SessionError, SessionStore};

/// On-disk layout of the session file
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    access_token: Option<String>,
    /// Kept as text so the user record survives byte-for-byte
    user: Option<String>,
}

/// JSON file store; writes go through a temp file and rename so a crash never
/// leaves one entry without the other.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<config dir>/kintai/session.json`
    pub fn default_path() -> Result<PathBuf, SessionError> {
        dirs::config_dir()
            .map(|dir| dir.join("kintai").join("session.json"))
            .ok_or(SessionError::NoConfigDir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> SessionFile {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SessionFile::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read session file");
                return SessionFile::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Ignoring corrupted session file");
            SessionFile::default()
        })
    }

    fn write(&self, file: &SessionFile) -> Result<(), SessionError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, file)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| SessionError::Io(e.error))?;

        debug!(path = %self.path.display(), "Session file written");
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn load_token(&self) -> Option<String> {
        let _guard = self.lock.lock();
        self.read().access_token
    }

    fn load_user(&self) -> Option<String> {
        let _guard = self.lock.lock();
        self.read().user
    }

    fn persist(&self, token: &str, user_json: &str) -> Result<(), SessionError> {
        let _guard = self.lock.lock();
        self.write(&SessionFile {
            access_token: Some(token.to_string()),
            user: Some(user_json.to_string()),
        })
    }

    fn clear(&self) -> Result<(), SessionError> {
        let _guard = self.lock.lock();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = r#"{"id": "1", "email": "a@b.co", "name": "山田", "role": "user"}"#;

    #[test]
    fn test_survives_reopen_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        FileSessionStore::new(&path).persist("t1", USER).unwrap();

        let reopened = FileSessionStore::new(&path);
        assert_eq!(reopened.load_token().as_deref(), Some("t1"));
        assert_eq!(reopened.load_user().as_deref(), Some(USER));
    }

    #[test]
    fn test_clear_removes_both_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.json"));

        store.persist("t1", USER).unwrap();
        store.clear().unwrap();
        assert!(store.load_token().is_none());
        assert!(store.load_user().is_none());
        assert!(!store.path().exists());

        // Clearing again is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupted_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{oops").unwrap();

        let store = FileSessionStore::new(&path);
        assert!(store.load_token().is_none());
        store.persist("t2", USER).unwrap();
        assert_eq!(store.load_token().as_deref(), Some("t2"));
    }
}
