//! Client-side session for the Lazy Days booking API.
//!
//! DESIGN
//! ======
//! `SessionStore` owns the signed-in user and reconciles three copies of it:
//! the in-memory request cache (what the app reads), durable storage (warm
//! start), and the server (authority). `AuthFlow` drives sign-in/out on top
//! of it. Both are constructed explicitly and passed around by clone; there
//! is no global client.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod session;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use api::{HttpUserApi, UserApi};
pub use auth::AuthFlow;
pub use cache::{QueryCache, QueryKey, QueryStatus};
pub use config::{RetryPolicy, SessionConfig};
pub use session::SessionStore;
pub use storage::{FileUserStorage, MemoryUserStorage, UserStorage};
pub use types::{Appointment, SessionError, SessionState, User};
