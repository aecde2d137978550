//! The `HealthStore` trait and its write preconditions.
//!
//! The trait is implemented by storage backends (`plainmed-store-sqlite`,
//! `plainmed-store-postgrest`). Higher layers depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  survey::{SurveyRecord, SurveyResponse, SurveyType},
  topic::{MedicalTopic, TopicQuery},
};

/// Condition a survey write must satisfy to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
  /// Insert or replace unconditionally (upsert keyed by user and survey type).
  Any,
  /// Insert only if no row exists yet.
  Absent,
  /// Update only if the stored row is at exactly this version.
  Version(i64),
}

/// Abstraction over the store that owns all persistent state.
///
/// At most one survey row exists per `(user_id, survey_type)`; backends
/// enforce this with a uniqueness constraint rather than read-then-write.
/// A write whose [`Precondition`] fails reports an error that converts into
/// [`Error::VersionConflict`](crate::Error::VersionConflict).
///
/// All methods return `Send` futures so the trait can be used from axum
/// handlers on a multi-threaded runtime.
pub trait HealthStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  /// Short label reported to API clients as the result `source`.
  fn backend_name(&self) -> &'static str;

  // ── Survey responses ──────────────────────────────────────────────────

  /// Fetch the row for `(user_id, survey_type)`. `None` if absent.
  fn get_survey(
    &self,
    user_id: Uuid,
    survey_type: SurveyType,
  ) -> impl Future<Output = Result<Option<SurveyRecord>, Self::Error>> + Send + '_;

  /// Write `response` to the row keyed by `(user_id, response.survey_type())`
  /// and return the stored record with its new version.
  fn put_survey(
    &self,
    user_id: Uuid,
    response: SurveyResponse,
    precondition: Precondition,
  ) -> impl Future<Output = Result<SurveyRecord, Self::Error>> + Send + '_;

  /// Insert a null-payload row for every [`SurveyType`] the user lacks.
  /// Existing rows are left untouched. Returns the number of rows created.
  fn seed_surveys(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Reference topics ──────────────────────────────────────────────────

  /// First `query.limit` topics matching `query`, in store order.
  fn search_topics<'a>(
    &'a self,
    query: &'a TopicQuery,
  ) -> impl Future<Output = Result<Vec<MedicalTopic>, Self::Error>> + Send + 'a;

  /// A single topic with every column populated. `None` if absent.
  fn get_topic(
    &self,
    topic_id: i64,
  ) -> impl Future<Output = Result<Option<MedicalTopic>, Self::Error>> + Send + '_;

  /// Distinct non-empty languages present in the reference table.
  fn list_languages(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;
}
