//! OAuth 1.0a error types.

use thiserror::Error;

pub type OAuth1Result<T> = Result<T, OAuth1Error>;

/// Coarse classification used for logging and for the flow outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Protocol,
    StateTamper,
    UserDenied,
    Transport,
}

#[derive(Debug, Error)]
pub enum OAuth1Error {
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Backchannel response exceeded {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("{endpoint} endpoint returned HTTP {status}")]
    UnexpectedStatus { endpoint: &'static str, status: u16 },

    #[error("Provider response is missing {0}")]
    MissingField(&'static str),

    #[error("Provider did not confirm the callback URL")]
    CallbackNotConfirmed,

    #[error("Invalid profile response: {0}")]
    InvalidProfile(String),

    #[error("Invalid state parameter: {0}")]
    InvalidState(String),

    #[error("Returned token does not match the request token")]
    TokenMismatch,

    /// `reason` is `access_denied` for a refusal on the provider's page and
    /// `rejected` when the authenticated hook dropped the identity
    #[error("Access denied: {reason}")]
    AccessDenied { reason: &'static str },

    #[error("Authentication hook failed: {0}")]
    Hook(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Identity error: {0}")]
    IdentityError(#[from] ras_identity_core::IdentityError),
}

impl OAuth1Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OAuth1Error::ConfigError(_) => ErrorKind::Configuration,
            OAuth1Error::HttpError(_) | OAuth1Error::ResponseTooLarge { .. } => {
                ErrorKind::Transport
            }
            OAuth1Error::InvalidState(_) => ErrorKind::StateTamper,
            OAuth1Error::AccessDenied { .. } => ErrorKind::UserDenied,
            OAuth1Error::UnexpectedStatus { .. }
            | OAuth1Error::MissingField(_)
            | OAuth1Error::CallbackNotConfirmed
            | OAuth1Error::InvalidProfile(_)
            | OAuth1Error::TokenMismatch
            | OAuth1Error::Hook(_)
            | OAuth1Error::SerializationError(_)
            | OAuth1Error::UrlError(_)
            | OAuth1Error::IdentityError(_) => ErrorKind::Protocol,
        }
    }

    /// Failures that point at a forged or replayed callback rather than a broken provider.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            OAuth1Error::InvalidState(_) | OAuth1Error::TokenMismatch
        )
    }
}
