//! Durable storage for the last-known signed-in user.
//!
//! SYSTEM CONTEXT
//! ==============
//! Storage is a warm-start cache, never the source of truth. The session seeds
//! from `read()` once and keeps the stored copy in step with the server after
//! each successful refresh.
//!
//! ERROR HANDLING
//! ==============
//! `read()` degrades to `None` on a missing or corrupt file so a bad cache
//! never blocks startup. Write and clear failures are returned; the session
//! layer logs them and carries on.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::types::{SessionError, User};

/// Read/write/clear access to the persisted user record.
pub trait UserStorage: Send + Sync {
    /// Last stored user, or `None` when nothing usable is stored.
    fn read(&self) -> Option<User>;

    /// Replace the stored user.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the record cannot be persisted.
    fn write(&self, user: &User) -> Result<(), SessionError>;

    /// Remove any stored user.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the record cannot be removed.
    fn clear(&self) -> Result<(), SessionError>;
}

// =============================================================================
// FILE STORAGE
// =============================================================================

/// One JSON `User` object in a file.
#[derive(Debug, Clone)]
pub struct FileUserStorage {
    path: PathBuf,
}

impl FileUserStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UserStorage for FileUserStorage {
    fn read(&self) -> Option<User> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "stored user unreadable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "stored user corrupt; ignoring");
                None
            }
        }
    }

    fn write(&self, user: &User) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SessionError::Storage(e.to_string()))?;
        }
        let raw = serde_json::to_string(user).map_err(|e| SessionError::Storage(e.to_string()))?;
        fs::write(&self.path, raw).map_err(|e| SessionError::Storage(e.to_string()))
    }

    fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Storage(e.to_string())),
        }
    }
}

// =============================================================================
// MEMORY STORAGE
// =============================================================================

/// Process-local storage for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryUserStorage {
    user: Mutex<Option<User>>,
}

impl MemoryUserStorage {
    #[must_use]
    pub fn new(initial: Option<User>) -> Self {
        Self { user: Mutex::new(initial) }
    }
}

impl UserStorage for MemoryUserStorage {
    fn read(&self) -> Option<User> {
        self.user
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write(&self, user: &User) -> Result<(), SessionError> {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = Some(user.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
