//! Failure classification for API responses
//!
//! Two questions are asked of every non-2xx response:
//! 1. Is it a session failure the interceptor should act on? (`classify_failure`)
//! 2. What error does the caller see? (`classify_error`)
//!
//! Only a 401 whose body message is one of the two sentinels is refreshable.
//! Any other 401 means the session is unusable and forces sign-out.

use serde::Deserialize;

use crate::error::Error;

/// Body messages the backend uses for an expired or unknown access token.
pub const REFRESHABLE_MESSAGES: &[&str] = &["token.expired", "token.invalid"];

/// What the interceptor should do with a failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFailure {
    /// 401 with a token sentinel: renew the token and replay
    Refreshable,
    /// 401 for any other reason: sign out, no renewal
    Invalid,
    /// Not a session problem
    None,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// The server's `message` field, if the body is a JSON object carrying one.
pub fn server_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body).ok()?.message
}

/// Decide whether a failed response is a session failure.
pub fn classify_failure(status: u16, body: &[u8]) -> SessionFailure {
    if status != 401 {
        return SessionFailure::None;
    }
    match server_message(body) {
        Some(message) if REFRESHABLE_MESSAGES.contains(&message.as_str()) => {
            SessionFailure::Refreshable
        }
        _ => SessionFailure::Invalid,
    }
}

/// Turn a failed response into the error the caller receives.
///
/// A structured body with a message becomes `Domain`; anything else keeps
/// the raw status and body.
pub fn classify_error(status: u16, body: &[u8]) -> Error {
    match server_message(body) {
        Some(message) => Error::Domain { status, message },
        None => Error::Status {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_token_is_refreshable() {
        let body = br#"{"status":"error","message":"token.expired"}"#;
        assert_eq!(classify_failure(401, body), SessionFailure::Refreshable);
    }

    #[test]
    fn invalid_token_is_refreshable() {
        let body = br#"{"message":"token.invalid"}"#;
        assert_eq!(classify_failure(401, body), SessionFailure::Refreshable);
    }

    #[test]
    fn other_401_message_invalidates_session() {
        let body = r#"{"message":"Usuário desativado."}"#.as_bytes();
        assert_eq!(classify_failure(401, body), SessionFailure::Invalid);
    }

    #[test]
    fn unstructured_401_invalidates_session() {
        assert_eq!(classify_failure(401, b"Unauthorized"), SessionFailure::Invalid);
        assert_eq!(classify_failure(401, b""), SessionFailure::Invalid);
    }

    #[test]
    fn sentinel_match_is_exact() {
        let body = br#"{"message":"Token.Expired"}"#;
        assert_eq!(classify_failure(401, body), SessionFailure::Invalid);
        let body = br#"{"message":"token expired"}"#;
        assert_eq!(classify_failure(401, body), SessionFailure::Invalid);
    }

    #[test]
    fn sentinel_on_other_status_is_not_a_session_failure() {
        let body = br#"{"message":"token.expired"}"#;
        assert_eq!(classify_failure(403, body), SessionFailure::None);
        assert_eq!(classify_failure(500, body), SessionFailure::None);
    }

    #[test]
    fn structured_body_becomes_domain_error() {
        let err = classify_error(400, br#"{"status":"error","message":"Informe o nome."}"#);
        match err {
            Error::Domain { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Informe o nome.");
            }
            other => panic!("expected Domain, got {other:?}"),
        }
    }

    #[test]
    fn unstructured_body_keeps_status() {
        let err = classify_error(502, b"<html>Bad Gateway</html>");
        match err {
            Error::Status { status, body } => {
                assert_eq!(status, 502);
                assert!(body.contains("Bad Gateway"));
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn non_string_message_is_not_domain() {
        let err = classify_error(500, br#"{"message":{"code":1}}"#);
        assert!(matches!(err, Error::Status { status: 500, .. }));
    }
}
