//! HTTP error mapping (spec §7).
//!
//! One centralized taxonomy replaces the teacher's per-handler
//! `(StatusCode, Json(...))` tuples (`routes.rs::generate_diagram`) with a
//! single `ApiError -> Response` conversion, logged exactly once at this
//! boundary with `tracing::error!`, generalizing the teacher's single
//! `tracing::error!("PlantUML generation failed: {}", e)` call site.

use crate::dto::ErrorBody;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diagramastext_core::error::{
    ApiErrorKind, CiamError, CodecError, PredictionError, RendererError, RepositoryError,
    SerializeError,
};

pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_content(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::InvalidContent, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Unauthorized, message)
    }

    pub fn not_exists() -> Self {
        Self::new(ApiErrorKind::HandlerNotExists, "not exists")
    }

    pub fn invalid_method() -> Self {
        Self::new(ApiErrorKind::InvalidMethod, "")
    }
}

impl From<SerializeError> for ApiError {
    fn from(e: SerializeError) -> Self {
        Self::new(ApiErrorKind::CoreLogic, e.to_string())
    }
}

impl From<CodecError> for ApiError {
    fn from(e: CodecError) -> Self {
        Self::new(ApiErrorKind::CoreLogic, e.to_string())
    }
}

impl From<RendererError> for ApiError {
    fn from(e: RendererError) -> Self {
        Self::new(ApiErrorKind::RendererError, e.to_string())
    }
}

impl From<PredictionError> for ApiError {
    fn from(e: PredictionError) -> Self {
        match e {
            PredictionError::Provider(body) => Self::new(ApiErrorKind::PredictionError, body),
            other => Self::new(ApiErrorKind::PredictionError, other.to_string()),
        }
    }
}

impl From<CiamError> for ApiError {
    fn from(e: CiamError) -> Self {
        match e {
            CiamError::Validation(msg) => Self::new(ApiErrorKind::ValidationError, msg),
            CiamError::NoPendingConfirmation => {
                Self::new(ApiErrorKind::ValidationError, "no pending confirmation")
            }
            CiamError::Deactivated => Self::new(ApiErrorKind::Unauthorized, "unauthorized"),
            CiamError::WrongSecret => Self::new(ApiErrorKind::Unauthorized, "unauthorized"),
            CiamError::UserNotFound => Self::new(ApiErrorKind::Unauthorized, "unauthorized"),
            CiamError::EmailUnverified => Self::new(ApiErrorKind::Unauthorized, "unauthorized"),
            CiamError::Unauthorized(_) => Self::new(ApiErrorKind::Unauthorized, "unauthorized"),
            CiamError::StaleAccessToken => Self::new(ApiErrorKind::Unauthorized, "unauthorized"),
            CiamError::Repository(e) => Self::new(ApiErrorKind::CoreLogic, e.to_string()),
            CiamError::Mailer(e) => Self::new(ApiErrorKind::CoreLogic, e.to_string()),
            CiamError::Signer(e) => Self::new(ApiErrorKind::CoreLogic, e.to_string()),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        Self::new(ApiErrorKind::CoreLogic, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        tracing::error!(
            "[type:{}][code:{}] {}",
            self.kind.as_str(),
            status.as_u16(),
            self.message
        );

        match self.kind {
            ApiErrorKind::InvalidMethod => status.into_response(),
            ApiErrorKind::HandlerNotExists => {
                (status, Json(ErrorBody { error: "not exists".into() })).into_response()
            }
            ApiErrorKind::PredictionError => (status, self.message).into_response(),
            ApiErrorKind::CoreLogic | ApiErrorKind::RendererError | ApiErrorKind::Serialization => {
                (status, Json(ErrorBody { error: "internal error".into() })).into_response()
            }
            ApiErrorKind::Unauthorized => {
                (status, Json(ErrorBody { error: "unauthorized".into() })).into_response()
            }
            ApiErrorKind::InvalidContent => {
                (status, Json(ErrorBody { error: "wrong request content".into() })).into_response()
            }
            ApiErrorKind::ValidationError => {
                (status, Json(ErrorBody { error: self.message })).into_response()
            }
        }
    }
}
