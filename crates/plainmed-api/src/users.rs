//! Handler for `POST /initialize-user`.

use std::sync::Arc;

use axum::{
  Extension, Json,
  extract::{State, rejection::JsonRejection},
};
use plainmed_core::{Error, records, session::SessionUser, store::HealthStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{check_owner, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct InitializeBody {
  pub user_id: Option<Uuid>,
  /// Accepted for compatibility with sign-up clients; not stored.
  #[serde(default)]
  pub email:   Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Initialized {
  pub success: bool,
  /// Survey rows created by this call; `0` when the user was already set up.
  pub created: usize,
}

/// `POST /initialize-user` — body: `{"user_id":"...","email":"..."}`.
///
/// Seeds the empty survey rows for a new account. Safe to repeat.
pub async fn initialize<S>(
  State(store): State<Arc<S>>,
  session: Option<Extension<SessionUser>>,
  body: Result<Json<InitializeBody>, JsonRejection>,
) -> Result<Json<Initialized>, ApiError>
where
  S: HealthStore,
{
  let Json(body) = body?;
  let user_id = body.user_id.ok_or_else(|| Error::invalid("user_id is required"))?;
  check_owner(&session, user_id)?;

  let created = records::initialize_user(store.as_ref(), user_id).await?;
  tracing::info!(%user_id, created, "user initialised");
  Ok(Json(Initialized { success: true, created }))
}
