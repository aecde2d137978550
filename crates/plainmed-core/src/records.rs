//! Store-agnostic operations on survey records.
//!
//! Array-valued fields are merged with a read-modify-write cycle. Each write
//! is conditional on the version that was read, so a concurrent writer makes
//! the write fail instead of being silently overwritten; the cycle then
//! re-reads and re-applies the change.

use uuid::Uuid;

use crate::{
  Error, Result,
  store::{HealthStore, Precondition},
  survey::{Condition, MedicalHistory, SurveyResponse, SurveyType},
};

/// Attempts made by a read-modify-write cycle before giving up.
pub const MAX_WRITE_ATTEMPTS: usize = 5;

/// Seed the empty survey rows for a newly created account.
///
/// Idempotent: a second call creates nothing and returns `0`.
pub async fn initialize_user<S: HealthStore>(store: &S, user_id: Uuid) -> Result<usize> {
  store.seed_surveys(user_id).await.map_err(Into::into)
}

/// The user's medical history, or an empty one if the form was never filled.
pub async fn load_history<S: HealthStore>(store: &S, user_id: Uuid) -> Result<MedicalHistory> {
  let record = store
    .get_survey(user_id, SurveyType::MedicalHistory)
    .await
    .map_err(Into::into)?;

  Ok(
    record
      .and_then(|r| r.response)
      .and_then(|r| r.as_medical_history().cloned())
      .unwrap_or_default(),
  )
}

/// Add `incoming` to the user's conditions, de-duplicated by `concept_id`.
///
/// Adding a condition that is already present is a no-op.
pub async fn add_conditions<S: HealthStore>(
  store: &S,
  user_id: Uuid,
  incoming: Vec<Condition>,
) -> Result<MedicalHistory> {
  if incoming.is_empty() {
    return Err(Error::invalid("at least one condition is required"));
  }
  incoming.iter().try_for_each(Condition::validate)?;

  update_history(store, user_id, |history| {
    history.merge_conditions(incoming.iter().cloned()) > 0
  })
  .await
}

/// Remove the condition with `concept_id`. Removing an absent one is a no-op.
pub async fn remove_condition<S: HealthStore>(
  store: &S,
  user_id: Uuid,
  concept_id: &str,
) -> Result<MedicalHistory> {
  update_history(store, user_id, |history| history.remove_condition(concept_id)).await
}

/// Run `apply` against the current history and write the result back if it
/// reports a change, retrying on version conflicts.
async fn update_history<S, F>(store: &S, user_id: Uuid, mut apply: F) -> Result<MedicalHistory>
where
  S: HealthStore,
  F: FnMut(&mut MedicalHistory) -> bool,
{
  let mut attempt = 0;
  loop {
    attempt += 1;

    let current = store
      .get_survey(user_id, SurveyType::MedicalHistory)
      .await
      .map_err(Into::into)?;

    let (mut history, precondition) = match current {
      None => (MedicalHistory::default(), Precondition::Absent),
      Some(record) => (
        record
          .response
          .as_ref()
          .and_then(SurveyResponse::as_medical_history)
          .cloned()
          .unwrap_or_default(),
        Precondition::Version(record.version),
      ),
    };

    if !apply(&mut history) {
      return Ok(history);
    }

    let written = store
      .put_survey(user_id, SurveyResponse::MedicalHistory(history), precondition)
      .await
      .map_err(Into::into);

    match written {
      Ok(record) => {
        return Ok(
          record
            .response
            .and_then(|r| r.as_medical_history().cloned())
            .unwrap_or_default(),
        );
      }
      Err(Error::VersionConflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => continue,
      Err(e) => return Err(e),
    }
  }
}
