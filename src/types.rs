//! Session types — user records, wire envelopes, and errors.
//!
//! DESIGN
//! ======
//! These types mirror the booking server's JSON payloads so serde round-trips
//! stay lossless between the REST API, the in-memory cache, and the storage
//! file. The session layer only ever looks at `User::id`; everything else is
//! carried through untouched.

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;

use serde::{Deserialize, Serialize};

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by session, API, and storage operations.
///
/// `Clone` so a single fetch outcome can be handed to every caller that was
/// waiting on the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The request never produced a response (connect, timeout, body read).
    #[error("network request failed: {0}")]
    Network(String),

    /// The server answered with a non-success status other than 400/401/403.
    #[error("server responded with status {status}")]
    Server { status: u16, body: String },

    /// The server rejected the bearer token.
    #[error("authorization rejected: status {status}")]
    Auth { status: u16 },

    /// The user record carries no token, so no authorized request can be built.
    #[error("user {user_id} has no session token")]
    MissingToken { user_id: u64 },

    /// Sign-in or sign-up was refused with a server-provided message.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Durable storage could not be written or cleared.
    #[error("storage failed: {0}")]
    Storage(String),

    /// The cache entry was evicted while the fetch was still in flight.
    #[error("fetch cancelled before completion")]
    Cancelled,
}

impl SessionError {
    /// Stable machine-readable code for logs and CLI output.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Network(_) => "E_NETWORK",
            Self::Server { .. } => "E_SERVER_STATUS",
            Self::Auth { .. } => "E_AUTH",
            Self::MissingToken { .. } => "E_MISSING_TOKEN",
            Self::Rejected(_) => "E_REJECTED",
            Self::MalformedResponse(_) => "E_MALFORMED_RESPONSE",
            Self::Storage(_) => "E_STORAGE",
            Self::Cancelled => "E_CANCELLED",
        }
    }

    /// Whether repeating the same request could plausibly succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// USER
// =============================================================================

/// A booking-site user as returned by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Server-assigned identifier; the only field the session layer inspects.
    pub id: u64,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// JWT issued at sign-in. Absent on records that never authenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Who is signed in right now.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated(User),
}

impl SessionState {
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Unauthenticated => None,
            Self::Authenticated(user) => Some(user),
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

impl From<Option<User>> for SessionState {
    fn from(user: Option<User>) -> Self {
        user.map_or(Self::Unauthenticated, Self::Authenticated)
    }
}

// =============================================================================
// APPOINTMENTS
// =============================================================================

/// A booked spa appointment belonging to the signed-in user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: u64,
    /// ISO-8601 start time as sent by the server.
    pub date_time: String,
    pub treatment_id: u64,
    pub treatment_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

// =============================================================================
// WIRE ENVELOPES
// =============================================================================

/// Email/password body for `POST /signin` and `POST /user`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// `{ "user": User }` body returned by user endpoints.
#[derive(Debug, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

/// `{ "appointments": [...] }` body returned by the appointments endpoint.
#[derive(Debug, Deserialize)]
pub struct AppointmentsResponse {
    pub appointments: Vec<Appointment>,
}

/// `{ "message": "..." }` body sent with 400 responses on auth endpoints.
#[derive(Debug, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
