//! Sign-in, sign-up, and sign-out on top of the session.
//!
//! SYSTEM CONTEXT
//! ==============
//! These are the only callers of `SessionStore::update_user` and
//! `SessionStore::clear_user` in this crate. A successful sign-in is
//! persisted immediately so it survives a restart even if no refresh runs.

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::UserApi;
use crate::session::SessionStore;
use crate::types::{Credentials, SessionError, User};

#[derive(Clone)]
pub struct AuthFlow {
    api: Arc<dyn UserApi>,
    session: SessionStore,
}

impl AuthFlow {
    #[must_use]
    pub fn new(api: Arc<dyn UserApi>, session: SessionStore) -> Self {
        Self { api, session }
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// `POST /signin` and make the returned user current.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] for bad credentials, or any API
    /// error. The session is left untouched on failure.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, SessionError> {
        let user = self.api.sign_in(&credentials(email, password)).await?;
        Ok(self.establish(user, "signed in"))
    }

    /// `POST /user` to register, then make the new user current.
    ///
    /// # Errors
    ///
    /// Same conditions as [`AuthFlow::sign_in`].
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<User, SessionError> {
        let user = self.api.sign_up(&credentials(email, password)).await?;
        Ok(self.establish(user, "signed up"))
    }

    pub fn sign_out(&self) {
        let user_id = self.session.peek_user().map(|u| u.id);
        self.session.clear_user();
        info!(user_id, "signed out");
    }

    fn establish(&self, user: User, event: &'static str) -> User {
        self.session.update_user(user.clone());
        if let Err(e) = self.session.persist_current() {
            warn!(user_id = user.id, error = %e, "sign-in not persisted; will retry on next refresh");
        }
        info!(user_id = user.id, email = %user.email, "{event}");
        user
    }
}

fn credentials(email: &str, password: &str) -> Credentials {
    Credentials { email: email.trim().to_owned(), password: password.to_owned() }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
