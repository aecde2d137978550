//! Handlers for `/medical-history/{user_id}/conditions` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/medical-history/{user_id}/conditions` | Current conditions; empty when the form is unfilled |
//! | `POST`   | `/medical-history/{user_id}/conditions` | Body: one [`Condition`] or an array; returns the merged history |
//! | `DELETE` | `/medical-history/{user_id}/conditions/{concept_id}` | Returns the history after removal |

use std::sync::Arc;

use axum::{
  Extension, Json,
  extract::{
    Path, State,
    rejection::{JsonRejection, PathRejection},
  },
};
use plainmed_core::{
  records,
  session::SessionUser,
  store::HealthStore,
  survey::{Condition, MedicalHistory},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{check_owner, error::ApiError};

/// `GET /medical-history/{user_id}/conditions`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  session: Option<Extension<SessionUser>>,
  path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<Condition>>, ApiError>
where
  S: HealthStore,
{
  let Path(user_id) = path?;
  check_owner(&session, user_id)?;

  let history = records::load_history(store.as_ref(), user_id).await?;
  Ok(Json(history.conditions))
}

/// Either a single condition or a batch.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ConditionsBody {
  Many(Vec<Condition>),
  One(Condition),
}

impl From<ConditionsBody> for Vec<Condition> {
  fn from(b: ConditionsBody) -> Self {
    match b {
      ConditionsBody::Many(v) => v,
      ConditionsBody::One(c) => vec![c],
    }
  }
}

/// `POST /medical-history/{user_id}/conditions` — adding a condition already
/// present is a no-op.
pub async fn add<S>(
  State(store): State<Arc<S>>,
  session: Option<Extension<SessionUser>>,
  path: Result<Path<Uuid>, PathRejection>,
  body: Result<Json<ConditionsBody>, JsonRejection>,
) -> Result<Json<MedicalHistory>, ApiError>
where
  S: HealthStore,
{
  let Path(user_id) = path?;
  check_owner(&session, user_id)?;
  let Json(body) = body?;

  let history = records::add_conditions(store.as_ref(), user_id, body.into()).await?;
  tracing::debug!(%user_id, total = history.conditions.len(), "conditions merged");
  Ok(Json(history))
}

/// `DELETE /medical-history/{user_id}/conditions/{concept_id}`
pub async fn remove<S>(
  State(store): State<Arc<S>>,
  session: Option<Extension<SessionUser>>,
  path: Result<Path<(Uuid, String)>, PathRejection>,
) -> Result<Json<MedicalHistory>, ApiError>
where
  S: HealthStore,
{
  let Path((user_id, concept_id)) = path?;
  check_owner(&session, user_id)?;

  let history = records::remove_condition(store.as_ref(), user_id, &concept_id).await?;
  Ok(Json(history))
}
