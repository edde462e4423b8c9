//! Shared fixtures for unit tests: sample records and a scripted `UserApi`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::api::{UserApi, jwt_token};
use crate::storage::UserStorage;
use crate::types::{Appointment, Credentials, SessionError, User};

#[must_use]
pub fn user(id: u64) -> User {
    User {
        id,
        email: format!("user{id}@example.com"),
        name: Some(format!("User {id}")),
        address: None,
        phone: None,
        token: Some(format!("jwt-{id}")),
    }
}

#[must_use]
pub fn appointment(id: u64, user_id: u64) -> Appointment {
    Appointment {
        id,
        date_time: "2026-10-20T10:00:00.000Z".into(),
        treatment_id: 1,
        treatment_name: "Massage".into(),
        user_id: Some(user_id),
    }
}

/// Scripted API. `fetch_user` pops queued responses and echoes the request
/// user once the queue is empty. With a gate, every fetch first waits for a
/// semaphore permit so tests can hold requests in flight.
#[derive(Default)]
pub struct MockApi {
    pub fetch_responses: Mutex<VecDeque<Result<User, SessionError>>>,
    pub auth_response: Mutex<Option<Result<User, SessionError>>>,
    pub appointments: Vec<Appointment>,
    pub fetch_calls: AtomicUsize,
    pub appointment_calls: AtomicUsize,
    pub auth_calls: AtomicUsize,
    pub gate: Option<Arc<Semaphore>>,
}

impl MockApi {
    #[must_use]
    pub fn with_responses(responses: Vec<Result<User, SessionError>>) -> Self {
        Self { fetch_responses: Mutex::new(responses.into()), ..Self::default() }
    }

    #[must_use]
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self { gate: Some(gate), ..Self::default() }
    }

    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
    }
}

#[async_trait::async_trait]
impl UserApi for MockApi {
    async fn fetch_user(&self, user: &User) -> Result<User, SessionError> {
        jwt_token(user)?;
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        let next = self.fetch_responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(user.clone()))
    }

    async fn fetch_user_appointments(&self, user: &User) -> Result<Vec<Appointment>, SessionError> {
        jwt_token(user)?;
        self.appointment_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        Ok(self.appointments.clone())
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<User, SessionError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        self.auth_response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(SessionError::Rejected(format!("unknown user {}", credentials.email))))
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<User, SessionError> {
        self.sign_in(credentials).await
    }
}

/// Storage whose writes always fail; reads return the initial value.
pub struct FailingStorage(pub Option<User>);

impl UserStorage for FailingStorage {
    fn read(&self) -> Option<User> {
        self.0.clone()
    }

    fn write(&self, _user: &User) -> Result<(), SessionError> {
        Err(SessionError::Storage("disk full".into()))
    }

    fn clear(&self) -> Result<(), SessionError> {
        Err(SessionError::Storage("read-only".into()))
    }
}
