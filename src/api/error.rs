use thiserror::Error;

/// How the store reacts to a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Session is no longer valid: clear it and redirect to sign-in.
    SignOut,
    /// Show a non-blocking notice; state stays as it was and the user may retry.
    Notice,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Session expired (status {0})")]
    Unauthorized(u16),
    #[error("Server rejected the request: {0}")]
    Rejected(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

impl TransportError {
    /// Status codes that mean the session is gone.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => TransportError::Unauthorized(status),
            _ => TransportError::HttpStatus(status),
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, TransportError::Unauthorized(_))
    }

    /// The one recovery policy every feed call follows: auth failures sign
    /// out, everything else is a notice.
    pub fn recovery(&self) -> Recovery {
        if self.is_auth_failure() {
            Recovery::SignOut
        } else {
            Recovery::Notice
        }
    }
}
