//! REST client for the booking server's user endpoints.
//!
//! ERROR HANDLING
//! ==============
//! Every failure maps onto `SessionError` so the cache can store it and share
//! it with waiters: transport problems are `Network`, 401/403 are `Auth`,
//! other non-2xx are `Server`, and bodies that do not decode are
//! `MalformedResponse`. Nothing is retried here; retry policy belongs to the
//! session layer.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::config::HttpTimeouts;
use crate::types::{Appointment, AppointmentsResponse, Credentials, MessageResponse, SessionError, User, UserResponse};

/// Remote authority for user records. Enables mocking in tests.
#[async_trait::async_trait]
pub trait UserApi: Send + Sync {
    /// Re-read `user` from the server using its own bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingToken`] without sending anything if
    /// `user` has no token; otherwise any transport/status/decode error.
    async fn fetch_user(&self, user: &User) -> Result<User, SessionError>;

    /// List appointments booked by `user`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`UserApi::fetch_user`].
    async fn fetch_user_appointments(&self, user: &User) -> Result<Vec<Appointment>, SessionError>;

    /// Exchange credentials for an authenticated user record.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] when the server refuses the
    /// credentials, or [`SessionError::MalformedResponse`] if the returned
    /// user carries no token.
    async fn sign_in(&self, credentials: &Credentials) -> Result<User, SessionError>;

    /// Register a new account and return it signed in.
    ///
    /// # Errors
    ///
    /// Same conditions as [`UserApi::sign_in`].
    async fn sign_up(&self, credentials: &Credentials) -> Result<User, SessionError>;
}

/// Bearer token for authorized requests on behalf of `user`.
///
/// # Errors
///
/// Returns [`SessionError::MissingToken`] if the user record has none.
pub fn jwt_token(user: &User) -> Result<&str, SessionError> {
    user.token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(SessionError::MissingToken { user_id: user.id })
}

pub(crate) fn user_endpoint(base_url: &str, user_id: u64) -> String {
    format!("{base_url}/user/{user_id}")
}

pub(crate) fn user_appointments_endpoint(base_url: &str, user_id: u64) -> String {
    format!("{base_url}/user/{user_id}/appointments")
}

pub(crate) fn status_error(status: StatusCode, body: String) -> SessionError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SessionError::Auth { status: status.as_u16() },
        _ => SessionError::Server { status: status.as_u16(), body },
    }
}

pub(crate) fn decode<T: DeserializeOwned>(text: &str) -> Result<T, SessionError> {
    serde_json::from_str(text).map_err(|e| SessionError::MalformedResponse(e.to_string()))
}

/// Map an auth endpoint's response onto a signed-in user.
pub(crate) fn parse_auth_response(status: StatusCode, text: &str) -> Result<User, SessionError> {
    if status == StatusCode::BAD_REQUEST {
        let message = decode::<MessageResponse>(text).map_or_else(|_| "bad request".to_owned(), |m| m.message);
        return Err(SessionError::Rejected(message));
    }
    if !status.is_success() {
        return Err(status_error(status, text.to_owned()));
    }
    let user = decode::<UserResponse>(text)?.user;
    jwt_token(&user).map_err(|_| SessionError::MalformedResponse("signed-in user has no token".into()))?;
    Ok(user)
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpUserApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpUserApi {
    /// Build a client for `base_url` (no trailing slash).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::HttpClientBuild`] if reqwest rejects the
    /// configuration.
    pub fn new(base_url: impl Into<String>, timeouts: HttpTimeouts) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| SessionError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.into() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_authorized(&self, url: String, user: &User) -> Result<String, SessionError> {
        let token = jwt_token(user)?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(status_error(status, text));
        }
        Ok(text)
    }

    async fn post_credentials(&self, path: &str, credentials: &Credentials) -> Result<User, SessionError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(url)
            .json(credentials)
            .send()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))?;
        parse_auth_response(status, &text)
    }
}

#[async_trait::async_trait]
impl UserApi for HttpUserApi {
    async fn fetch_user(&self, user: &User) -> Result<User, SessionError> {
        let text = self
            .get_authorized(user_endpoint(&self.base_url, user.id), user)
            .await?;
        Ok(decode::<UserResponse>(&text)?.user)
    }

    async fn fetch_user_appointments(&self, user: &User) -> Result<Vec<Appointment>, SessionError> {
        let text = self
            .get_authorized(user_appointments_endpoint(&self.base_url, user.id), user)
            .await?;
        Ok(decode::<AppointmentsResponse>(&text)?.appointments)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<User, SessionError> {
        self.post_credentials("/signin", credentials).await
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<User, SessionError> {
        self.post_credentials("/user", credentials).await
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
