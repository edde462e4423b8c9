//! Signed-in user session: cache, durable storage, and server kept in step.
//!
//! ARCHITECTURE
//! ============
//! `SessionStore` is built once at startup and cloned into whatever needs the
//! current user. The `user` cache entry is the read surface: it is seeded
//! from durable storage on first access, refreshed from `GET /user/{id}` in
//! the background, and overwritten directly by sign-in/sign-out.
//!
//! After each refresh that lands in the cache, durable storage is rewritten
//! (or cleared) to match the server. `update_user` deliberately does not
//! touch storage: until the next refresh or an explicit `persist_current`,
//! a crash loses the new sign-in. `clear_user` clears storage immediately,
//! because the evicted entry is re-seeded from storage on next access.
//!
//! ERROR HANDLING
//! ==============
//! Refresh errors are recorded on the cache entry (stale data stays readable)
//! and returned to whoever awaited the refresh. Background refreshes only
//! log. Storage write failures never fail a refresh.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{HttpUserApi, UserApi};
use crate::cache::{FetchOutcome, FetchTicket, QueryCache, QueryKey, QueryStatus};
use crate::config::{RetryPolicy, SessionConfig};
use crate::storage::{FileUserStorage, UserStorage};
use crate::types::{Appointment, SessionError, SessionState, User};

/// Shared handle to the signed-in user. Cheap to clone.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    cache: QueryCache,
    api: Arc<dyn UserApi>,
    storage: Arc<dyn UserStorage>,
    retry: RetryPolicy,
}

impl SessionStore {
    #[must_use]
    pub fn new(api: Arc<dyn UserApi>, storage: Arc<dyn UserStorage>, retry: RetryPolicy) -> Self {
        Self { inner: Arc::new(SessionInner { cache: QueryCache::new(), api, storage, retry }) }
    }

    /// Wire the HTTP API and file storage described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn from_config(config: &SessionConfig) -> Result<Self, SessionError> {
        let api = HttpUserApi::new(config.api_base_url.clone(), config.timeouts)?;
        let storage = FileUserStorage::new(config.storage_path.clone());
        Ok(Self::new(Arc::new(api), Arc::new(storage), config.retry))
    }

    /// The API this session refreshes against, for flows that share it.
    #[must_use]
    pub fn api(&self) -> Arc<dyn UserApi> {
        Arc::clone(&self.inner.api)
    }

    /// The underlying request cache, for dependents that share its keys.
    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    // =========================================================================
    // READ
    // =========================================================================

    /// Best currently-known user. Never blocks.
    ///
    /// The first call (and the first after `clear_user`) seeds the cache from
    /// durable storage and schedules a background refresh on the current
    /// tokio runtime, if there is one.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        if self.ensure_seeded() {
            self.spawn_refresh();
        }
        self.cached_user()
    }

    /// Like [`SessionStore::current_user`] but never schedules a refresh.
    #[must_use]
    pub fn peek_user(&self) -> Option<User> {
        self.ensure_seeded();
        self.cached_user()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from(self.current_user())
    }

    #[must_use]
    pub fn status(&self) -> QueryStatus {
        self.inner.cache.status(QueryKey::User)
    }

    /// Error from the most recent failed refresh, cleared by the next success.
    #[must_use]
    pub fn last_error(&self) -> Option<SessionError> {
        self.inner
            .cache
            .snapshot(QueryKey::User)
            .and_then(|s| s.last_error)
    }

    fn cached_user(&self) -> Option<User> {
        self.inner
            .cache
            .get_data::<Option<User>>(QueryKey::User)
            .flatten()
    }

    fn ensure_seeded(&self) -> bool {
        if self.inner.cache.contains(QueryKey::User) {
            return false;
        }
        let stored = self.inner.storage.read();
        let seeded = self.inner.cache.seed(QueryKey::User, &stored);
        if seeded {
            debug!(user_id = stored.as_ref().map(|u| u.id), "session seeded from storage");
        }
        seeded
    }

    fn spawn_refresh(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime; background refresh skipped");
            return;
        };
        let session = self.clone();
        runtime.spawn(async move {
            if let Err(e) = session.refresh().await {
                warn!(error = %e, code = e.error_code(), "background user refresh failed");
            }
        });
    }

    // =========================================================================
    // REFRESH
    // =========================================================================

    /// Re-read the current user from the server and bring storage in line.
    ///
    /// A signed-out session resolves to `None` without any request. If a
    /// refresh is already running, this waits for it instead of sending a
    /// second one.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after retries are exhausted, or
    /// [`SessionError::Cancelled`] if the session was cleared while waiting
    /// on another caller's refresh.
    pub async fn refresh(&self) -> Result<Option<User>, SessionError> {
        self.ensure_seeded();
        let guard = match self.inner.cache.begin_fetch(QueryKey::User) {
            FetchTicket::Follower(waiter) => return parse_user(waiter.wait().await?),
            FetchTicket::Leader(guard) => guard,
        };

        let outcome = match self.cached_user() {
            None => Ok(None),
            Some(user) => with_retry(self.inner.retry, QueryKey::User, || self.inner.api.fetch_user(&user))
                .await
                .map(Some),
        };

        let applied = guard.complete(outcome.clone().and_then(|u| user_value(u.as_ref())));
        let user = outcome?;
        if applied {
            self.sync_storage(user.as_ref());
            info!(user_id = user.as_ref().map(|u| u.id), "user refreshed");
        } else {
            debug!("session cleared during refresh; storage left untouched");
        }
        Ok(user)
    }

    fn sync_storage(&self, user: Option<&User>) {
        let result = match user {
            Some(user) => self.inner.storage.write(user),
            None => self.inner.storage.clear(),
        };
        if let Err(e) = result {
            warn!(error = %e, "durable user storage not updated");
        }
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Replace the cached user, typically right after sign-in.
    ///
    /// Durable storage is not written; call [`SessionStore::persist_current`]
    /// when the sign-in has to survive a restart before the next refresh.
    /// When the user id changes, the user and appointments entries are
    /// evicted first, so a refresh still running for the previous user is
    /// discarded instead of landing over the new one.
    pub fn update_user(&self, user: User) {
        let previous = self.cached_user().map(|u| u.id);
        if previous != Some(user.id) {
            self.inner
                .cache
                .remove_queries(&[QueryKey::Appointments, QueryKey::User]);
        }
        info!(user_id = user.id, "session user updated");
        self.inner.cache.set_data(QueryKey::User, &Some(user));
    }

    /// Write the cached user to durable storage now (or clear it when signed out).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if storage cannot be updated.
    pub fn persist_current(&self) -> Result<(), SessionError> {
        match self.cached_user() {
            Some(user) => self.inner.storage.write(&user),
            None => self.inner.storage.clear(),
        }
    }

    /// Sign the session out: null the user, clear durable storage, and evict
    /// the user and appointments entries so both are refetched on next access.
    pub fn clear_user(&self) {
        self.inner.cache.set_data(QueryKey::User, &Option::<User>::None);
        if let Err(e) = self.inner.storage.clear() {
            warn!(error = %e, "stored user not cleared on sign-out");
        }
        self.inner
            .cache
            .remove_queries(&[QueryKey::Appointments, QueryKey::User]);
        info!("session user cleared");
    }

    // =========================================================================
    // DEPENDENT QUERIES
    // =========================================================================

    /// Appointments for the signed-in user; empty when signed out.
    ///
    /// Served from cache once resolved; evicted by `clear_user`. Reads the
    /// user like [`SessionStore::peek_user`], so no user refresh is scheduled.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after retries are exhausted.
    pub async fn user_appointments(&self) -> Result<Vec<Appointment>, SessionError> {
        let Some(user) = self.peek_user() else {
            return Ok(Vec::new());
        };
        if self.inner.cache.status(QueryKey::Appointments) == QueryStatus::Resolved {
            if let Some(cached) = self.inner.cache.get_data::<Vec<Appointment>>(QueryKey::Appointments) {
                return Ok(cached);
            }
        }

        let api = Arc::clone(&self.inner.api);
        let retry = self.inner.retry;
        let value = self
            .inner
            .cache
            .fetch(QueryKey::Appointments, || async move {
                let list =
                    with_retry(retry, QueryKey::Appointments, || api.fetch_user_appointments(&user)).await?;
                serde_json::to_value(list).map_err(|e| SessionError::MalformedResponse(e.to_string()))
            })
            .await?;
        serde_json::from_value(value).map_err(|e| SessionError::MalformedResponse(e.to_string()))
    }
}

fn user_value(user: Option<&User>) -> FetchOutcome {
    serde_json::to_value(user).map_err(|e| SessionError::MalformedResponse(e.to_string()))
}

fn parse_user(value: Value) -> Result<Option<User>, SessionError> {
    serde_json::from_value(value).map_err(|e| SessionError::MalformedResponse(e.to_string()))
}

/// Run `op`, retrying retryable failures on the policy's back-off schedule.
async fn with_retry<T, F, Fut>(policy: RetryPolicy, key: QueryKey, mut op: F) -> Result<T, SessionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SessionError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.retryable() && attempt < policy.retries => {
                let delay = policy.delay(attempt);
                attempt += 1;
                warn!(%key, attempt, ?delay, error = %e, "fetch failed; retrying");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
