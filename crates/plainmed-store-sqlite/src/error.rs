//! Error type for `plainmed-store-sqlite`.

use plainmed_core::survey::SurveyType;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored row could not be decoded into a domain type.
  #[error("corrupt row: {0}")]
  Corrupt(String),

  /// A conditional write found the row missing, present, or at another version.
  #[error("{survey_type} response for user {user_id} failed its write precondition")]
  Conflict {
    user_id:     Uuid,
    survey_type: SurveyType,
  },
}

impl From<Error> for plainmed_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Conflict { user_id, survey_type } => {
        plainmed_core::Error::VersionConflict { user_id, survey_type }
      }
      other => plainmed_core::Error::StoreUnavailable(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
