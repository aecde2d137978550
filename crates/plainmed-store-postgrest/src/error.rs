//! Error type for `plainmed-store-postgrest`.

use plainmed_core::survey::SurveyType;
use reqwest::StatusCode;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("request to hosted store timed out")]
  Timeout,

  #[error("transport error: {0}")]
  Transport(#[source] reqwest::Error),

  #[error("hosted store answered {status}: {body}")]
  Status { status: StatusCode, body: String },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A returned row could not be decoded into a domain type.
  #[error("corrupt row: {0}")]
  Corrupt(String),

  #[error("session token was rejected")]
  InvalidToken,

  /// A conditional write found the row missing, present, or at another version.
  #[error("{survey_type} response for user {user_id} failed its write precondition")]
  Conflict {
    user_id:     Uuid,
    survey_type: SurveyType,
  },
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() { Error::Timeout } else { Error::Transport(e) }
  }
}

impl Error {
  /// Whether the same idempotent request could succeed if sent again.
  pub fn is_transient(&self) -> bool {
    match self {
      Error::Timeout | Error::Transport(_) => true,
      Error::Status { status, .. } => status.is_server_error(),
      _ => false,
    }
  }
}

impl From<Error> for plainmed_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Timeout => plainmed_core::Error::Timeout,
      Error::InvalidToken => {
        plainmed_core::Error::Unauthenticated("invalid or expired session token".into())
      }
      Error::Conflict { user_id, survey_type } => {
        plainmed_core::Error::VersionConflict { user_id, survey_type }
      }
      other => plainmed_core::Error::StoreUnavailable(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
