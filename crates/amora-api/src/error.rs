//! API error type with the stable client-facing body
//! `{timestamp, status, error, message, path}`. The request path is filled
//! in by [`error_envelope`], layered at the router root.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use amora_db::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("an unexpected error occurred")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Duplicate(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error kind string, part of the client contract.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "Not Found",
            Self::Duplicate(_) => "Duplicate Action",
            Self::Unauthorized(_) => "Unauthorized",
            Self::Forbidden(_) => "Forbidden",
            Self::BadRequest(_) => "Bad Request",
            Self::Internal(_) => "Internal Server Error",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(id) => Self::NotFound(format!("user not found: {id}")),
            StoreError::RequestNotFound(id) => {
                Self::NotFound(format!("connection request not found: {id}"))
            }
            StoreError::NotReceiver { .. } => {
                Self::Unauthorized("user is not the addressed party of this request".into())
            }
            StoreError::Conflict(message) => Self::Duplicate(message),
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub error: &'static str,
    pub message: String,
    pub path: String,
}

/// Carried on error responses so the envelope middleware can rebuild the
/// body with the request path.
#[derive(Clone)]
struct ErrorParts {
    kind: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(source) = &self {
            error!("internal error: {:#}", source);
        }

        let status = self.status();
        let parts = ErrorParts {
            kind: self.kind(),
            message: self.to_string(),
        };
        let body = ErrorBody {
            timestamp: Utc::now(),
            status: status.as_u16(),
            error: parts.kind,
            message: parts.message.clone(),
            path: String::new(),
        };

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(parts);
        response
    }
}

/// Root-level middleware: rewrites error responses produced by [`ApiError`]
/// so the body carries the request path.
pub async fn error_envelope(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    let Some(parts) = response.extensions().get::<ErrorParts>().cloned() else {
        return response;
    };

    let status = response.status();
    let body = ErrorBody {
        timestamp: Utc::now(),
        status: status.as_u16(),
        error: parts.kind,
        message: parts.message,
        path,
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_the_taxonomy() {
        let not_found: ApiError = StoreError::UserNotFound(7).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.kind(), "Not Found");

        let unauthorized: ApiError = StoreError::NotReceiver {
            request_id: 1,
            user_id: 2,
        }
        .into();
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

        let duplicate: ApiError = StoreError::Conflict("taken".into()).into();
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);
        assert_eq!(duplicate.to_string(), "taken");

        let internal: ApiError = StoreError::LockPoisoned.into();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // Internal details never reach the client message.
        assert_eq!(internal.to_string(), "an unexpected error occurred");
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(ApiError::Forbidden("x".into()).kind(), "Forbidden");
        assert_eq!(ApiError::BadRequest("x".into()).kind(), "Bad Request");
        assert_eq!(
            ApiError::Duplicate("x".into()).kind(),
            "Duplicate Action"
        );
    }
}
