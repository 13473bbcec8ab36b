use thiserror::Error;
use tracing::warn;

/// Login failures against the LibreLinkUp identity endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Network failure during login: {0}")]
    NetworkFailure(String),

    #[error("Malformed login response: {0}")]
    MalformedResponse(String),

    #[error("Login rejected by server (status {status})")]
    Rejected { status: i32 },
}

impl AuthError {
    /// Short description suitable for display next to the credential fields.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials => "Invalid email or password".to_string(),
            AuthError::NetworkFailure(_) => {
                "Unable to reach LibreLinkUp. Check your connection.".to_string()
            }
            AuthError::MalformedResponse(_) => "Unexpected login response".to_string(),
            AuthError::Rejected { status: 4 } => {
                "Accept the terms of use in the LibreLinkUp app".to_string()
            }
            AuthError::Rejected { status } => format!("Login rejected (status {})", status),
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AuthError::MalformedResponse(e.to_string())
        } else if e.is_timeout() {
            AuthError::NetworkFailure("request timed out".to_string())
        } else {
            AuthError::NetworkFailure(e.to_string())
        }
    }
}

/// Failures while fetching readings from either backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Network error: {0}")]
    Network(String),
}

/// Maximum length for error response bodies in log messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FetchError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => FetchError::Unauthorized,
            code => {
                warn!(status = code, body = %truncated, "Request failed");
                FetchError::HttpStatus(code)
            }
        }
    }

    /// Short description for the status line.
    pub fn user_message(&self) -> String {
        match self {
            FetchError::Timeout => "Connection timed out".to_string(),
            FetchError::HttpStatus(code @ 500..=599) => format!("Server error ({})", code),
            FetchError::HttpStatus(404) => "Endpoint not found. Check the URL.".to_string(),
            FetchError::HttpStatus(code) => format!("Request failed ({})", code),
            FetchError::Decode(_) => "Unexpected data from server".to_string(),
            FetchError::Unauthorized => "Not authorized. Check the token.".to_string(),
            FetchError::Network(_) => "Unable to connect to server".to_string(),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::from_status(status, "")
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert_eq!(
            FetchError::from_status(reqwest::StatusCode::UNAUTHORIZED, ""),
            FetchError::Unauthorized
        );
        assert_eq!(
            FetchError::from_status(reqwest::StatusCode::BAD_GATEWAY, "oops"),
            FetchError::HttpStatus(502)
        );
        assert_eq!(
            FetchError::from_status(reqwest::StatusCode::FORBIDDEN, ""),
            FetchError::HttpStatus(403)
        );
    }

    #[test]
    fn test_truncate_body() {
        let short = "short";
        assert_eq!(FetchError::truncate_body(short), "short");

        let long = "x".repeat(600);
        let truncated = FetchError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(500)));
        assert!(truncated.contains("600 total bytes"));

        // Never split a multi-byte character
        let multibyte = "é".repeat(400);
        let truncated = FetchError::truncate_body(&multibyte);
        assert!(truncated.contains("800 total bytes"));
    }

    #[test]
    fn test_user_messages_hide_detail() {
        let e = FetchError::Decode("expected value at line 1 column 1".to_string());
        assert!(!e.user_message().contains("line 1"));
        let e = AuthError::NetworkFailure("dns error: no such host".to_string());
        assert!(!e.user_message().contains("dns"));
        assert_eq!(
            AuthError::Rejected { status: 4 }.user_message(),
            "Accept the terms of use in the LibreLinkUp app"
        );
    }
}
