//! Error taxonomy for the delivery board.
//!
//! Every variant renders as the message shown to the handler. Nothing here
//! triggers a retry; callers surface the text and let the user act again.

use crate::order::OrderStatus;

/// Message shown whenever a call needs a session and none is stored.
pub const NOT_LOGGED_IN_MESSAGE: &str = "No authentication token found. Please log in.";

/// Message shown for every failed login, whatever the cause.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid username or email or password";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No authentication token found. Please log in.")]
    NotLoggedIn,

    #[error("Invalid username or email or password")]
    InvalidCredentials,

    /// The backend rejected the bearer token (HTTP 401/403).
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Network(String),

    #[error("{0}")]
    UnexpectedResponse(String),

    /// Non-success status that is not an authorization failure.
    #[error("{message} (HTTP {status})")]
    Backend { status: u16, message: String },

    #[error("Invalid file type. Only image files are allowed. ({0})")]
    InvalidImage(String),

    #[error("Order cannot move from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order {0} is not on the board")]
    OrderNotFound(String),

    #[error("Credential store error: {0}")]
    Storage(String),

    #[error("Local database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures that mean the stored credential is no good.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::NotLoggedIn | Self::Unauthorized(_))
    }

    /// Prefix a transport/backend failure with the action that was running,
    /// e.g. "Error fetching orders: ...". Other variants pass through.
    pub(crate) fn during(self, action: &str) -> Self {
        match self {
            Self::Network(msg) => Self::Network(format!("Error {action}: {msg}")),
            Self::Backend { status, message } => Self::Backend {
                status,
                message: format!("Error {action}: {message}"),
            },
            other => other,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<keyring::Error> for Error {
    fn from(e: keyring::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
