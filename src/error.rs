//! Error types for kin-client.

use thiserror::Error;

/// The main error type for kin-client.
#[derive(Debug, Error)]
pub enum Error {
    // ── Request outcomes ─────────────────────────────────────────────────────
    /// No response was received (connection refused, timeout, unreadable body).
    #[error("Network error: {0}")]
    Transport(String),

    /// The server rejected the request with an application-defined code.
    #[error("Request rejected ({code}): {message}")]
    Business {
        /// Envelope code returned by the server.
        code: i64,
        /// Message returned by the server.
        message: String,
    },

    /// The session expired and could not be recovered by a token refresh.
    #[error("Session expired: {0}")]
    AuthExpired(String),

    /// The token is valid but lacks privilege; the session has been ended.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The payload did not have the expected shape.
    #[error("Unexpected payload: {0}")]
    Decode(String),

    // ── Storage ──────────────────────────────────────────────────────────────
    /// Credential storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    // ── Infrastructure ───────────────────────────────────────────────────────
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if this error ended the session and the user must log in again.
    #[must_use]
    pub fn ends_session(&self) -> bool {
        matches!(self, Error::AuthExpired(_) | Error::Forbidden(_))
    }

    /// Envelope code carried by a business error.
    #[must_use]
    pub fn code(&self) -> Option<i64> {
        match self {
            Error::Business { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Convenience type alias.
pub type Result<T> = std::result::Result<T, Error>;
