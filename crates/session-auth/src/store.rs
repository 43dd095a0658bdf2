//! Persistent token storage
//!
//! `TokenStore` is the durable key-value collaborator behind the in-memory
//! session: it survives process restarts and holds exactly one token pair.
//! `FileTokenStore` keeps the pair in a JSON file written atomically
//! (temp file + rename) with 0600 permissions. `MemoryTokenStore` is the
//! process-local variant for embedding and tests.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::tokens::{Session, StoredSession};

/// Durable storage for the current session.
///
/// Uses `Pin<Box<dyn Future>>` return types so it can be held as
/// `Arc<dyn TokenStore>`.
pub trait TokenStore: Send + Sync {
    /// Read the stored session. A store with nothing in it yields an empty session.
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Session>> + Send + '_>>;

    /// Replace the stored session.
    fn save<'a>(
        &'a self,
        session: &'a Session,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Remove both tokens.
    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Session file on local disk.
///
/// A missing file is an empty session. The Mutex serializes writers so
/// concurrent saves never share the temp file.
pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Session> {
        if !tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| Error::Io(format!("checking session file: {e}")))?
        {
            debug!(path = %self.path.display(), "session file not found, no stored session");
            return Ok(Session::default());
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
        let stored: StoredSession = serde_json::from_str(&contents)
            .map_err(|e| Error::StoreParse(format!("parsing session file: {e}")))?;
        let session = Session::from(stored);
        info!(
            path = %self.path.display(),
            has_access = session.access_token.is_some(),
            has_refresh = session.refresh_token.is_some(),
            "loaded session"
        );
        Ok(session)
    }

    async fn write(&self, session: &Session) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_atomic(&self.path, &StoredSession::from(session)).await
    }

    async fn remove(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed session file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("removing session file: {e}"))),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Session>> + Send + '_>> {
        Box::pin(self.read())
    }

    fn save<'a>(
        &'a self,
        session: &'a Session,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.write(session))
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.remove())
    }
}

/// Write the session to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over the
/// target. Sets 0600 permissions since the file contains bearer tokens.
async fn write_atomic(path: &Path, stored: &StoredSession) -> Result<()> {
    let json = serde_json::to_string_pretty(stored)
        .map_err(|e| Error::StoreParse(format!("serializing session: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("session path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}

/// Process-local store; contents are lost on exit.
#[derive(Default)]
pub struct MemoryTokenStore {
    session: std::sync::Mutex<Session>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing session, as if it had been persisted earlier.
    pub fn with_session(session: Session) -> Self {
        Self {
            session: std::sync::Mutex::new(session),
        }
    }

    /// Current contents.
    pub fn snapshot(&self) -> Session {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn replace(&self, session: Session) {
        *self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Session>> + Send + '_>> {
        let session = self.snapshot();
        Box::pin(async move { Ok(session) })
    }

    fn save<'a>(
        &'a self,
        session: &'a Session,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        self.replace(session.clone());
        Box::pin(async { Ok(()) })
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.replace(Session::default());
        Box::pin(async { Ok(()) })
    }
}
