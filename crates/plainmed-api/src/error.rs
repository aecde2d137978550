//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] plainmed_core::Error),

  /// A conditional write named a version the row no longer has.
  #[error("precondition failed: {0}")]
  PreconditionFailed(String),

  /// The request could not be decoded (body, path, or query string).
  #[error("bad request: {0}")]
  BadRequest(String),
}

/// Convert any backend error into an [`ApiError`].
pub fn store_err<E: Into<plainmed_core::Error>>(e: E) -> ApiError { ApiError::Core(e.into()) }

#[derive(Serialize)]
struct ErrorBody {
  error:   String,
  #[serde(skip_serializing_if = "Option::is_none")]
  details: Option<String>,
}

impl ApiError {
  fn status(&self) -> StatusCode {
    use plainmed_core::Error as E;
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
      ApiError::Core(e) => match e {
        E::InvalidInput(_) => StatusCode::BAD_REQUEST,
        E::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        E::NotFound(_) => StatusCode::NOT_FOUND,
        E::VersionConflict { .. } => StatusCode::CONFLICT,
        E::Timeout => StatusCode::GATEWAY_TIMEOUT,
        E::StoreUnavailable(_) | E::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    use plainmed_core::Error as E;

    let status = self.status();
    let (error, details) = match &self {
      ApiError::Core(E::InvalidInput(m)) | ApiError::BadRequest(m) => (m.clone(), None),
      ApiError::Core(E::Unauthenticated(m)) => ("unauthenticated".to_owned(), Some(m.clone())),
      ApiError::Core(E::NotFound(m)) => (m.clone(), None),
      ApiError::Core(e @ E::VersionConflict { .. }) => (e.to_string(), None),
      ApiError::PreconditionFailed(m) => (m.clone(), None),
      ApiError::Core(E::Timeout) => ("store call timed out".to_owned(), None),
      ApiError::Core(e) => ("store unavailable".to_owned(), Some(e.to_string())),
    };

    if status.is_server_error() {
      tracing::error!(%status, error = %self, "request failed");
    }

    let body = ErrorBody {
      error,
      details: details.filter(|_| cfg!(debug_assertions)),
    };
    let mut res = (status, Json(body)).into_response();
    if status == StatusCode::UNAUTHORIZED {
      res
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    res
  }
}

impl From<JsonRejection> for ApiError {
  fn from(r: JsonRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(r: PathRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(r: QueryRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}
