//! Errors from the B2 store
//!
//! An expired token is the only failure the store acts on: the call is
//! retried once after re-authorizing. Anything else is handed to the durable
//! tier as-is, where a failed read becomes a miss.

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum B2Error {
    #[error("B2 auth token expired")]
    AuthExpired,

    #[error("B2 rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Error body B2 sends with every non-2xx response
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

impl B2Error {
    /// Classify a failed response from its status and body
    pub fn from_status(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorBody>(body).ok();

        // 401 also covers missing capabilities, which a new token won't fix
        let expired = status == 401
            && parsed.as_ref().map_or(true, |b| {
                matches!(b.code.as_str(), "expired_auth_token" | "bad_auth_token")
            });
        if expired {
            return B2Error::AuthExpired;
        }

        let message = match parsed {
            Some(b) if !b.message.is_empty() => format!("{}: {}", b.code, b.message),
            Some(b) => b.code,
            None => body.trim().to_string(),
        };
        B2Error::Rejected { status, message }
    }
}

/// Whether `e` means the token must be refreshed before retrying
pub(crate) fn is_auth_expired(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<B2Error>(), Some(B2Error::AuthExpired))
}
