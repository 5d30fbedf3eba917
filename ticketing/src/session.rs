//! Purchaser sessions.
//!
//! A [`Session`] is the bearer token plus the profile returned at login. It is
//! an ordinary value: the checkout state carries the session it was opened
//! with and gateway calls receive it as an argument.
//!
//! [`SessionManager`] owns the lifecycle:
//!
//! ```text
//! hydrate (restore from store) → active (begin / current) → teardown (clear)
//! ```

use crate::types::UserProfile;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors persisting a session
#[derive(Error, Debug)]
pub enum SessionError {
    /// Reading or writing the session failed
    #[error("Session storage error: {0}")]
    Io(#[from] io::Error),

    /// The stored session could not be parsed
    #[error("Stored session is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A signed-in purchaser
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    token: String,
    user: UserProfile,
}

impl Session {
    /// Creates a session from a bearer token and the purchaser's profile
    #[must_use]
    pub fn new(token: impl Into<String>, user: UserProfile) -> Self {
        Self {
            token: token.into(),
            user,
        }
    }

    /// Bearer token for authenticated calls
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The purchaser's profile
    #[must_use]
    pub const fn user(&self) -> &UserProfile {
        &self.user
    }

    /// Whether the purchaser may buy member tickets
    #[must_use]
    pub const fn membership_verified(&self) -> bool {
        self.user.membership_verified()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

/// Where a session survives between runs
pub trait SessionStore: Send + Sync {
    /// Loads the stored session, if any
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the store cannot be read or holds garbage.
    fn load(&self) -> Result<Option<Session>, SessionError>;

    /// Replaces the stored session
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the store cannot be written.
    fn save(&self, session: &Session) -> Result<(), SessionError>;

    /// Removes the stored session
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the store cannot be written.
    fn clear(&self) -> Result<(), SessionError>;
}

/// Session store kept in memory; clones share the slot
#[derive(Clone, Debug, Default)]
pub struct InMemorySessionStore {
    slot: Arc<Mutex<Option<Session>>>,
}

impl InMemorySessionStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Session>>, SessionError> {
        self.slot
            .lock()
            .map_err(|_| SessionError::Io(io::Error::other("session lock poisoned")))
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self) -> Result<Option<Session>, SessionError> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        *self.lock()? = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.lock()? = None;
        Ok(())
    }
}

/// Session store backed by a JSON file
///
/// Writes go to a sibling temporary file that is then renamed over the
/// target, so a crash never leaves a half-written session behind. The file
/// holds a bearer token and is readable by its owner only.
///
/// Calls block; [`SessionManager`] runs them on the blocking thread pool.
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Stores the session at `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the session file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Session>, SessionError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec_pretty(session)?;
        let tmp = self.path.with_extension("tmp");
        write_owner_only(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_owner_only(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // A leftover temp file keeps its old mode, so set it explicitly.
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(bytes)?;
    file.sync_all()
}

/// Owns the current session and keeps the store in step with it
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    current: RwLock<Option<Session>>,
}

impl SessionManager {
    /// Creates a manager with no active session
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
        }
    }

    /// Restores the stored session, if any, and makes it current
    ///
    /// A corrupt stored session is discarded and treated as signed out.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the store cannot be read.
    pub async fn hydrate(&self) -> Result<Option<Session>, SessionError> {
        let restored = match self.on_store(|store| store.load()).await {
            Ok(session) => session,
            Err(SessionError::Corrupt(error)) => {
                tracing::warn!(%error, "Discarding corrupt stored session");
                self.on_store(|store| store.clear()).await?;
                None
            },
            Err(error) => return Err(error),
        };

        if let Some(session) = &restored {
            tracing::info!(user_id = %session.user().id, "Session restored");
        }
        *self.current.write().await = restored.clone();
        Ok(restored)
    }

    /// Makes `session` current and persists it
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the store cannot be written; the
    /// session is not made current in that case.
    pub async fn begin(&self, session: Session) -> Result<(), SessionError> {
        let saved = session.clone();
        self.on_store(move |store| store.save(&saved)).await?;
        tracing::info!(user_id = %session.user().id, "Session started");
        *self.current.write().await = Some(session);
        Ok(())
    }

    /// The active session, if any
    pub async fn current(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    /// Signs out: forgets the current session and clears the store
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the store cannot be cleared. The
    /// in-memory session is dropped regardless.
    pub async fn teardown(&self) -> Result<(), SessionError> {
        let previous = self.current.write().await.take();
        if let Some(session) = previous {
            tracing::info!(user_id = %session.user().id, "Session ended");
        }
        self.on_store(|store| store.clear()).await
    }

    /// Runs a store call on the blocking thread pool
    async fn on_store<T, F>(&self, op: F) -> Result<T, SessionError>
    where
        F: FnOnce(&dyn SessionStore) -> Result<T, SessionError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| SessionError::Io(io::Error::other(e)))?
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}
