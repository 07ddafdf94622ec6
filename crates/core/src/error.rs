//! Error taxonomy shared by every component.
//!
//! Each component returns its own leaf error type; [`ApiErrorKind`] is the
//! classification the dispatcher maps onto an HTTP status and body. Keeping
//! the mapping centralized here (rather than duplicated per handler) is what
//! lets the dispatcher log `[type:<Kind>][code:<status>] <message>` exactly
//! once, at a single call site.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("empty input")]
    Empty,
    #[error("compression failed: {0}")]
    Compress(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
}

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("renderer returned status {status}")]
    Status { status: u16 },
    #[error("renderer request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("{0}")]
    Provider(String),
    #[error("failed to parse model output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum CiamError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("user is deactivated")]
    Deactivated,
    #[error("no pending confirmation")]
    NoPendingConfirmation,
    #[error("wrong secret")]
    WrongSecret,
    #[error("user not found")]
    UserNotFound,
    #[error("email not verified")]
    EmailUnverified,
    #[error("token is unauthorized: {0}")]
    Unauthorized(String),
    #[error("stale access token")]
    StaleAccessToken,
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("mailer error: {0}")]
    Mailer(#[from] MailerError),
    #[error("signer error: {0}")]
    Signer(#[from] SignerError),
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("conflict: primary key already exists")]
    Conflict,
    #[error("not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(String),
}

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("failed to send mail: {0}")]
    Send(String),
}

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signing failed: {0}")]
    Sign(String),
    #[error("verification failed: {0}")]
    Verify(String),
}

/// Classification used by the dispatcher to pick an HTTP status and body
/// template. See spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    InvalidContent,
    ValidationError,
    Unauthorized,
    PredictionError,
    RendererError,
    CoreLogic,
    HandlerNotExists,
    InvalidMethod,
    Serialization,
}

impl ApiErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidContent | Self::ValidationError => 422,
            Self::Unauthorized => 401,
            Self::PredictionError => 400,
            Self::RendererError | Self::CoreLogic | Self::Serialization => 500,
            Self::HandlerNotExists => 404,
            Self::InvalidMethod => 405,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidContent => "InvalidContent",
            Self::ValidationError => "ValidationError",
            Self::Unauthorized => "Unauthorized",
            Self::PredictionError => "PredictionError",
            Self::RendererError => "RendererError",
            Self::CoreLogic => "CoreLogic",
            Self::HandlerNotExists => "HandlerNotExists",
            Self::InvalidMethod => "InvalidMethod",
            Self::Serialization => "Serialization",
        }
    }
}
