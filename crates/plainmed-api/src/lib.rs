//! JSON REST API for plainmed.
//!
//! Exposes axum [`Router`]s backed by any [`plainmed_core::store::HealthStore`].
//! Routes are split in two so the caller can put a session gate in front of
//! the user-scoped ones only. Handlers read an optional [`SessionUser`]
//! request extension; when present, it must own the targeted records.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", plainmed_api::user_router(store.clone()).layer(gate))
//! .nest("/api", plainmed_api::reference_router(store))
//! ```

pub mod error;
pub mod history;
pub mod search;
pub mod surveys;
pub mod users;

use std::sync::Arc;

use axum::{
  Extension, Router,
  http::{HeaderValue, header},
  middleware::map_response,
  response::Response,
  routing::{delete, get, post},
};
use plainmed_core::{
  session::{SessionUser, authorize},
  store::HealthStore,
};
use uuid::Uuid;

pub use error::ApiError;

/// Routes that read or write one user's records.
pub fn user_router<S>(store: Arc<S>) -> Router<()>
where
  S: HealthStore + 'static,
{
  Router::new()
    // Personal info
    .route("/personal-info", post(surveys::save_personal_info::<S>))
    .route("/personal-info/{user_id}", get(surveys::personal_info::<S>))
    // Generic survey access
    .route(
      "/surveys/{user_id}/{survey_type}",
      get(surveys::get_one::<S>).put(surveys::put_one::<S>),
    )
    // Medical history
    .route(
      "/medical-history/{user_id}/conditions",
      get(history::list::<S>).post(history::add::<S>),
    )
    .route(
      "/medical-history/{user_id}/conditions/{concept_id}",
      delete(history::remove::<S>),
    )
    // Accounts
    .route("/initialize-user", post(users::initialize::<S>))
    .with_state(store)
    .layer(map_response(no_store))
}

/// Read-only routes over the reference topics.
pub fn reference_router<S>(store: Arc<S>) -> Router<()>
where
  S: HealthStore + 'static,
{
  Router::new()
    .route("/search", get(search::by_query::<S>).post(search::by_body::<S>))
    .route("/topics/{topic_id}", get(search::topic::<S>))
    .route("/languages", get(search::languages::<S>))
    .with_state(store)
    .layer(map_response(no_store))
}

/// Both routers merged, with no session gate.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: HealthStore + 'static,
{
  user_router(store.clone()).merge(reference_router(store))
}

/// Response mapper adding `Cache-Control: no-store`. Already applied by the
/// routers here; exported for layers stacked around them.
pub async fn no_store(mut res: Response) -> Response {
  res
    .headers_mut()
    .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
  res
}

/// Reject the request unless the session (if any) belongs to `user_id`.
pub(crate) fn check_owner(
  session: &Option<Extension<SessionUser>>,
  user_id: Uuid,
) -> Result<(), ApiError> {
  authorize(session.as_ref().map(|Extension(s)| s), user_id)?;
  Ok(())
}
