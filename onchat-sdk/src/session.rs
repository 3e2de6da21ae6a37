//! Persisted session state used for silent re-login.
//!
//! The backend hands out an opaque `RE_LOGIN_CODE` on LOGIN and RE_LOGIN
//! success. Together with the username it lets a fresh connection resume
//! the session without asking for the password again. The pair must
//! outlive the process, so it goes through a [`SessionStore`].

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The two persisted keys. Either may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Username of the last login.
    pub user: Option<String>,
    /// Opaque resumption token from the backend.
    pub relogin_code: Option<String>,
}

/// A complete `{username, token}` pair, usable for RE_LOGIN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub username: String,
    pub token: String,
}

impl Session {
    pub fn credential(&self) -> Option<SessionCredential> {
        match (&self.user, &self.relogin_code) {
            (Some(user), Some(code)) if !user.is_empty() && !code.is_empty() => {
                Some(SessionCredential {
                    username: user.clone(),
                    token: code.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.relogin_code.is_none()
    }
}

/// Durable storage for the [`Session`].
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Session>;
    fn save(&self, session: &Session) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// In-process store. Survives reconnects, not restarts.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Session>,
}

impl MemorySessionStore {
    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Session> {
        Ok(self.session.lock().clone())
    }

    fn save(&self, session: &Session) -> Result<()> {
        *self.session.lock() = session.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.session.lock() = Session::default();
        Ok(())
    }
}

/// TOML file store, by default at `<config dir>/onchat/session.toml`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("onchat")
            .join("session.toml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileSessionStore {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Session> {
        if !self.path.exists() {
            return Ok(Session::default());
        }
        let text = std::fs::read_to_string(&self.path)?;
        toml::from_str(&text)
            .map_err(|e| Error::Session(format!("bad session file {}: {e}", self.path.display())))
    }

    fn save(&self, session: &Session) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let text = toml::to_string_pretty(session)
            .map_err(|e| Error::Session(format!("can't serialize session: {e}")))?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
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

    #[test]
    fn credential_needs_both_keys() {
        let mut s = Session::default();
        assert!(s.credential().is_none());
        s.user = Some("alice".into());
        assert!(s.credential().is_none());
        s.relogin_code = Some("".into());
        assert!(s.credential().is_none());
        s.relogin_code = Some("tok".into());
        assert_eq!(
            s.credential(),
            Some(SessionCredential {
                username: "alice".into(),
                token: "tok".into()
            })
        );
    }

    #[test]
    fn memory_store_round_trip_and_clear() {
        let store = MemorySessionStore::default();
        let s = Session {
            user: Some("bob".into()),
            relogin_code: Some("xyz".into()),
        };
        store.save(&s).unwrap();
        assert_eq!(store.load().unwrap(), s);
        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested").join("session.toml"));
        assert!(store.load().unwrap().is_empty());
        store.clear().unwrap();
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onchat").join("session.toml");
        let s = Session {
            user: Some("carol".into()),
            relogin_code: Some("code-1".into()),
        };
        FileSessionStore::new(&path).save(&s).unwrap();

        let reopened = FileSessionStore::new(&path);
        assert_eq!(reopened.load().unwrap(), s);
        reopened.clear().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn file_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "user = [").unwrap();
        assert!(matches!(
            FileSessionStore::new(&path).load(),
            Err(Error::Session(_))
        ));
    }
}
