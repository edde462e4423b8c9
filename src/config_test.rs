use super::*;
use std::sync::{Mutex, MutexGuard, PoisonError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// # Safety
/// Callers must hold `env_lock()` so no other test touches the same vars.
unsafe fn clear_session_env() {
    unsafe {
        std::env::remove_var("SESSION_API_BASE_URL");
        std::env::remove_var("SESSION_STORAGE_PATH");
        std::env::remove_var("SESSION_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("SESSION_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("SESSION_FETCH_RETRIES");
        std::env::remove_var("SESSION_RETRY_BASE_MS");
        std::env::remove_var("SESSION_RETRY_MAX_MS");
    }
}

#[test]
fn from_env_defaults() {
    let _env = env_lock();
    unsafe { clear_session_env() };

    let cfg = SessionConfig::from_env().unwrap();
    assert_eq!(cfg.api_base_url, DEFAULT_API_BASE_URL);
    assert_eq!(cfg.storage_path, PathBuf::from(DEFAULT_STORAGE_PATH));
    assert_eq!(cfg.timeouts, HttpTimeouts::default());
    assert_eq!(cfg.retry, RetryPolicy::default());
}

#[test]
fn from_env_parses_overrides() {
    let _env = env_lock();
    unsafe {
        clear_session_env();
        std::env::set_var("SESSION_API_BASE_URL", "https://spa.example.test/api/");
        std::env::set_var("SESSION_STORAGE_PATH", "/tmp/lazyday/user.json");
        std::env::set_var("SESSION_REQUEST_TIMEOUT_SECS", "5");
        std::env::set_var("SESSION_CONNECT_TIMEOUT_SECS", "2");
        std::env::set_var("SESSION_FETCH_RETRIES", "0");
        std::env::set_var("SESSION_RETRY_BASE_MS", "50");
        std::env::set_var("SESSION_RETRY_MAX_MS", "400");
    }

    let cfg = SessionConfig::from_env().unwrap();
    assert_eq!(cfg.api_base_url, "https://spa.example.test/api");
    assert_eq!(cfg.storage_path, PathBuf::from("/tmp/lazyday/user.json"));
    assert_eq!(cfg.timeouts, HttpTimeouts { request_secs: 5, connect_secs: 2 });
    assert_eq!(cfg.retry, RetryPolicy { retries: 0, base_ms: 50, max_ms: 400 });

    unsafe { clear_session_env() };
}

#[test]
fn from_env_bad_number_falls_back() {
    let _env = env_lock();
    unsafe {
        clear_session_env();
        std::env::set_var("SESSION_FETCH_RETRIES", "lots");
    }

    let cfg = SessionConfig::from_env().unwrap();
    assert_eq!(cfg.retry.retries, DEFAULT_FETCH_RETRIES);

    unsafe { clear_session_env() };
}

#[test]
fn from_env_rejects_non_http_url() {
    let _env = env_lock();
    unsafe {
        clear_session_env();
        std::env::set_var("SESSION_API_BASE_URL", "ftp://spa.example.test");
    }

    let err = SessionConfig::from_env().unwrap_err();
    assert!(matches!(err, SessionError::ConfigParse(_)));

    unsafe { clear_session_env() };
}

#[test]
fn base_url_override_skips_invalid_env_url() {
    let _env = env_lock();
    unsafe {
        clear_session_env();
        std::env::set_var("SESSION_API_BASE_URL", "ftp://spa.example.test");
    }

    let cfg = SessionConfig::from_env_with_base_url(Some("http://127.0.0.1:9000/")).unwrap();
    assert_eq!(cfg.api_base_url, "http://127.0.0.1:9000");

    let err = SessionConfig::from_env_with_base_url(Some("spa.example.test")).unwrap_err();
    assert!(matches!(err, SessionError::ConfigParse(_)));

    unsafe { clear_session_env() };
}

#[test]
fn with_base_url_trims_slash() {
    let _env = env_lock();
    unsafe { clear_session_env() };
    let cfg = SessionConfig::from_env().unwrap().with_base_url("http://127.0.0.1:9000/").unwrap();
    assert_eq!(cfg.api_base_url, "http://127.0.0.1:9000");
}

// =============================================================================
// RetryPolicy
// =============================================================================

#[test]
fn retry_delay_doubles_until_cap() {
    let policy = RetryPolicy { retries: 5, base_ms: 1000, max_ms: 30_000 };
    assert_eq!(policy.delay(0), Duration::from_millis(1000));
    assert_eq!(policy.delay(1), Duration::from_millis(2000));
    assert_eq!(policy.delay(3), Duration::from_millis(8000));
    assert_eq!(policy.delay(5), Duration::from_millis(30_000));
}

#[test]
fn retry_delay_huge_attempt_saturates() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay(200), Duration::from_millis(DEFAULT_RETRY_MAX_MS));
}

#[test]
fn retry_none_is_zero() {
    let policy = RetryPolicy::none();
    assert_eq!(policy.retries, 0);
    assert_eq!(policy.delay(0), Duration::ZERO);
}
