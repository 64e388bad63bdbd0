//! Classification of server error payloads.
//!
//! Authentication failures end the session (credential cleared, no retry);
//! anything else is reported and left to the normal retry path.
//!
//! A structured `code` on the payload is authoritative. Servers that only
//! send free text fall back to a substring match on the message, which can
//! misfire on unrelated text containing the same words.

/// Structured codes that mean the session credential is no longer valid.
const AUTH_CODES: &[&str] = &["AUTH_FAILED", "UNAUTHORIZED", "USER_NOT_FOUND"];

/// Message fragments treated as authentication failures when no code is given.
const AUTH_MARKERS: &[&str] = &["authentication", "unauthorized", "user does not exist"];

/// How a server error should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The credential was rejected: log out, do not retry.
    AuthFailure,
    /// Anything else: surface and carry on.
    Other,
}

/// Classify an error payload from the server.
pub fn classify_server_error(message: &str, code: Option<&str>) -> ErrorClass {
    if let Some(code) = code {
        let code = code.trim();
        return if AUTH_CODES.iter().any(|c| c.eq_ignore_ascii_case(code)) {
            ErrorClass::AuthFailure
        } else {
            ErrorClass::Other
        };
    }

    let message = message.to_lowercase();
    if AUTH_MARKERS.iter().any(|m| message.contains(m)) {
        ErrorClass::AuthFailure
    } else {
        ErrorClass::Other
    }
}
