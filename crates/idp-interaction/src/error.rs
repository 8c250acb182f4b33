//! Interaction error types.
//!
//! [`EngineError`] is what the protocol engine reports. [`FailureReason`]
//! is the closed taxonomy the resolver hands to the HTTP layer; every
//! reason has a stable code used in redirect query strings.

use std::fmt;

use idp_auth::DirectoryError;
use thiserror::Error;

/// Errors reported by an interaction engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No live interaction with this uid.
    #[error("interaction session not found: {0}")]
    SessionNotFound(String),

    /// The interaction outlived its TTL.
    #[error("interaction session expired: {0}")]
    SessionExpired(String),

    /// The client is not registered.
    #[error("unknown client: {0}")]
    UnknownClient(String),

    /// The redirect URI is not registered for the client.
    #[error("redirect_uri not registered for client {client_id}: {redirect_uri}")]
    InvalidRedirectUri {
        /// Client id.
        client_id: String,
        /// Offending redirect URI.
        redirect_uri: String,
    },

    /// Malformed authorization request.
    #[error("invalid authorization request: {0}")]
    InvalidRequest(String),

    /// Grant handle does not exist.
    #[error("grant not found: {0}")]
    GrantNotFound(String),

    /// Account lookup through the adapter failed.
    #[error("account lookup failed: {0}")]
    Account(#[from] DirectoryError),

    /// Internal error.
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Checks if the interaction session is gone (missing or expired).
    #[must_use]
    pub const fn is_session_missing(&self) -> bool {
        matches!(self, Self::SessionNotFound(_) | Self::SessionExpired(_))
    }

    /// Returns the OAuth 2.0 error code for authorization request errors.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownClient(_) => "invalid_client",
            Self::InvalidRedirectUri { .. } | Self::InvalidRequest(_) => "invalid_request",
            Self::SessionNotFound(_)
            | Self::SessionExpired(_)
            | Self::GrantNotFound(_)
            | Self::Account(_)
            | Self::Internal(_) => "server_error",
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Why an interaction could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// Login or password left empty.
    MissingCredentials,
    /// Unknown login identifier or wrong password.
    InvalidCredentials,
    /// No live interaction session for the uid.
    InvalidSession,
    /// The pending prompt is not one this provider handles here.
    UnknownPrompt,
    /// Consent attempted without an authenticated account.
    Unauthorized,
    /// The user rejected the request.
    AccessDenied,
    /// Unexpected engine or directory failure.
    ServerError,
}

impl FailureReason {
    /// Stable code carried in redirect query strings.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidSession => "invalid_session",
            Self::UnknownPrompt => "unknown_prompt",
            Self::Unauthorized => "unauthorized",
            Self::AccessDenied => "access_denied",
            Self::ServerError => "server_error",
        }
    }

    /// Parses a code produced by [`FailureReason::code`].
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "missing_credentials" => Self::MissingCredentials,
            "invalid_credentials" => Self::InvalidCredentials,
            "invalid_session" => Self::InvalidSession,
            "unknown_prompt" => Self::UnknownPrompt,
            "unauthorized" => Self::Unauthorized,
            "access_denied" => Self::AccessDenied,
            "server_error" => Self::ServerError,
            _ => return None,
        })
    }

    /// Message shown to the user.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::MissingCredentials => "Please enter both username and password.",
            Self::InvalidCredentials => "Invalid username or password. Please try again.",
            Self::InvalidSession => {
                "Invalid or expired interaction session. Please restart the authentication process."
            }
            Self::UnknownPrompt => {
                "Unknown interaction type. Please restart the authentication process."
            }
            Self::Unauthorized => "You must sign in before granting access.",
            Self::AccessDenied => "The request was denied.",
            Self::ServerError => "A server error occurred. Please try again.",
        }
    }

    /// Only server errors are logged with full detail.
    #[must_use]
    pub const fn is_server_error(self) -> bool {
        matches!(self, Self::ServerError)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
