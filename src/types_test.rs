use super::*;

fn user() -> User {
    User {
        id: 7,
        email: "ada@example.com".into(),
        name: Some("Ada".into()),
        address: None,
        phone: None,
        token: Some("jwt-abc".into()),
    }
}

// =============================================================================
// SessionError
// =============================================================================

#[test]
fn retryable_network_and_server_faults() {
    assert!(SessionError::Network("connection reset".into()).retryable());
    assert!(SessionError::Server { status: 503, body: String::new() }.retryable());
    assert!(SessionError::Server { status: 429, body: String::new() }.retryable());
}

#[test]
fn not_retryable_auth_and_client_faults() {
    assert!(!SessionError::Auth { status: 401 }.retryable());
    assert!(!SessionError::Server { status: 404, body: String::new() }.retryable());
    assert!(!SessionError::MalformedResponse("x".into()).retryable());
    assert!(!SessionError::MissingToken { user_id: 1 }.retryable());
    assert!(!SessionError::Cancelled.retryable());
}

#[test]
fn error_codes_are_stable() {
    assert_eq!(SessionError::Auth { status: 403 }.error_code(), "E_AUTH");
    assert_eq!(SessionError::Network(String::new()).error_code(), "E_NETWORK");
    assert_eq!(SessionError::Storage(String::new()).error_code(), "E_STORAGE");
}

#[test]
fn error_display_includes_status() {
    let err = SessionError::Auth { status: 401 };
    assert_eq!(err.to_string(), "authorization rejected: status 401");
}

// =============================================================================
// User
// =============================================================================

#[test]
fn user_omits_absent_optionals() {
    let json = serde_json::to_value(user()).unwrap();
    assert_eq!(json["id"], 7);
    assert_eq!(json["token"], "jwt-abc");
    assert!(json.get("address").is_none());
    assert!(json.get("phone").is_none());
}

#[test]
fn user_parses_minimal_record() {
    let parsed: User = serde_json::from_str(r#"{"id":3,"email":"b@example.com"}"#).unwrap();
    assert_eq!(parsed.id, 3);
    assert!(parsed.token.is_none());
    assert!(parsed.name.is_none());
}

#[test]
fn user_response_envelope() {
    let body = r#"{"user":{"id":7,"email":"ada@example.com","token":"jwt-abc"}}"#;
    let parsed: UserResponse = serde_json::from_str(body).unwrap();
    assert_eq!(parsed.user.id, 7);
    assert_eq!(parsed.user.token.as_deref(), Some("jwt-abc"));
}

// =============================================================================
// SessionState
// =============================================================================

#[test]
fn session_state_from_option() {
    assert_eq!(SessionState::from(None), SessionState::Unauthenticated);
    let state = SessionState::from(Some(user()));
    assert!(state.is_authenticated());
    assert_eq!(state.user().map(|u| u.id), Some(7));
}

#[test]
fn session_state_default_is_unauthenticated() {
    assert!(!SessionState::default().is_authenticated());
    assert!(SessionState::default().user().is_none());
}

// =============================================================================
// Appointment
// =============================================================================

#[test]
fn appointment_uses_camel_case() {
    let body = r#"{"appointments":[{"id":1,"dateTime":"2026-10-20T10:00:00Z","treatmentId":2,"treatmentName":"Massage","userId":7}]}"#;
    let parsed: AppointmentsResponse = serde_json::from_str(body).unwrap();
    assert_eq!(parsed.appointments.len(), 1);
    assert_eq!(parsed.appointments[0].treatment_name, "Massage");
    assert_eq!(parsed.appointments[0].user_id, Some(7));
}
