//! Request-level error taxonomy.

use thiserror::Error;

/// Methods the service answers. Everything else is rejected before routing.
pub const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS";

/// Errors that end a single request.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::RequestInvalid`] → 400
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::MethodNotAllowed`] → 405
/// - [`ServiceError::GenerationFailed`] → 500
/// - [`ServiceError::Internal`] → 500
///
/// The [`Display`](std::fmt::Display) output is meant for logs. Use
/// [`ServiceError::message`] for anything sent to a client.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A query parameter or header failed validation. The message is
    /// client-safe and explains what to fix.
    #[error("invalid request: {0}")]
    RequestInvalid(String),

    /// No route matches the requested path.
    #[error("not found")]
    NotFound,

    /// The request method is outside the allow-list.
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    /// The password generator reported a failure.
    #[error("failed to generate {0}")]
    GenerationFailed(&'static str),

    /// An unexpected internal fault. Never carries detail.
    #[error("internal error")]
    Internal,
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::RequestInvalid(_) => 400,
            ServiceError::NotFound => 404,
            ServiceError::MethodNotAllowed(_) => 405,
            ServiceError::GenerationFailed(_) => 500,
            ServiceError::Internal => 500,
        }
    }

    /// Human-readable description safe to expose to callers.
    pub fn message(&self) -> String {
        match self {
            ServiceError::RequestInvalid(msg) => msg.clone(),
            ServiceError::NotFound => "Page not found. Check the URL and try again.".into(),
            ServiceError::MethodNotAllowed(method) => {
                format!("Method {method} not allowed. Must be GET, HEAD, or OPTIONS.")
            }
            ServiceError::GenerationFailed(what) => {
                format!("Cannot generate {what}. Please try again later.")
            }
            ServiceError::Internal => "Internal server error. Please try again later.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_codes() {
        assert_eq!(ServiceError::RequestInvalid("x".into()).http_status(), 400);
        assert_eq!(ServiceError::NotFound.http_status(), 404);
        assert_eq!(ServiceError::MethodNotAllowed("POST".into()).http_status(), 405);
        assert_eq!(ServiceError::GenerationFailed("PIN").http_status(), 500);
        assert_eq!(ServiceError::Internal.http_status(), 500);
    }

    #[test]
    fn method_message_names_the_method() {
        let e = ServiceError::MethodNotAllowed("DELETE".into());
        assert!(e.message().contains("DELETE"));
        assert!(e.message().contains("GET, HEAD, or OPTIONS"));
    }

    #[test]
    fn internal_message_is_generic() {
        let msg = ServiceError::Internal.message();
        assert_eq!(msg, "Internal server error. Please try again later.");
    }

    #[test]
    fn request_invalid_message_passes_through() {
        let e = ServiceError::RequestInvalid("length must be an integer".into());
        assert_eq!(e.message(), "length must be an integer");
        assert!(e.to_string().contains("length must be an integer"));
    }
}
