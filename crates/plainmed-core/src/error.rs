//! Error taxonomy shared by every plainmed crate.
//!
//! Backend crates define their own error enums and convert into this one, so
//! the HTTP layer can map any store failure onto a status code without knowing
//! which backend produced it.

use thiserror::Error;

use crate::survey::SurveyType;

#[derive(Debug, Error)]
pub enum Error {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("unauthenticated: {0}")]
  Unauthenticated(String),

  #[error("store unavailable: {0}")]
  StoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("store call timed out")]
  Timeout,

  /// A conditional write lost against a concurrent writer.
  #[error("{survey_type} response for user {user_id} was modified concurrently")]
  VersionConflict {
    user_id:     uuid::Uuid,
    survey_type: SurveyType,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn invalid(msg: impl Into<String>) -> Self { Self::InvalidInput(msg.into()) }

  /// Whether retrying the same idempotent call could succeed.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::StoreUnavailable(_) | Self::Timeout)
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
