//! Handlers for survey-response endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/personal-info/{user_id}` | `{hasCompletedForm, data}` |
//! | `POST` | `/personal-info` | Body: `{user_id, ageRange, gender, language}`; returns the saved answers |
//! | `GET`  | `/surveys/{user_id}/{survey_type}` | `{hasCompletedForm, data, version}` + `ETag` |
//! | `PUT`  | `/surveys/{user_id}/{survey_type}` | Body: the payload; optional `If-Match: "<version>"` |

use std::sync::Arc;

use axum::{
  Extension, Json,
  extract::{
    Path, State,
    rejection::{JsonRejection, PathRejection},
  },
  http::{HeaderMap, HeaderValue, header},
  response::{IntoResponse, Response},
};
use plainmed_core::{
  Error,
  session::SessionUser,
  store::{HealthStore, Precondition},
  survey::{PersonalInfo, SurveyRecord, SurveyResponse, SurveyType},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  check_owner,
  error::{ApiError, store_err},
};

// ─── Views ────────────────────────────────────────────────────────────────────

/// Survey state as returned to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyView {
  pub has_completed_form: bool,
  pub data:               Option<SurveyResponse>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub version:            Option<i64>,
}

impl SurveyView {
  fn of(record: Option<SurveyRecord>, with_version: bool) -> Self {
    let version = record.as_ref().map(|r| r.version).filter(|_| with_version);
    let data = record.and_then(|r| r.response);
    Self { has_completed_form: data.is_some(), data, version }
  }
}

fn etag(version: i64) -> HeaderValue {
  // A formatted integer is always a valid header value.
  HeaderValue::from_str(&format!("\"{version}\"")).unwrap_or(HeaderValue::from_static("\"0\""))
}

fn with_etag(view: SurveyView) -> Response {
  let tag = view.version.map(etag);
  let mut res = Json(view).into_response();
  if let Some(tag) = tag {
    res.headers_mut().insert(header::ETAG, tag);
  }
  res
}

// ─── Personal info ────────────────────────────────────────────────────────────

/// `GET /personal-info/{user_id}`
pub async fn personal_info<S>(
  State(store): State<Arc<S>>,
  session: Option<Extension<SessionUser>>,
  path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SurveyView>, ApiError>
where
  S: HealthStore,
{
  let Path(user_id) = path?;
  check_owner(&session, user_id)?;

  let record = store
    .get_survey(user_id, SurveyType::PersonalInfo)
    .await
    .map_err(store_err)?;
  Ok(Json(SurveyView::of(record, false)))
}

/// JSON body accepted by `POST /personal-info`: the answers plus their owner.
#[derive(Debug, Deserialize)]
pub struct PersonalInfoBody {
  #[serde(default)]
  pub user_id: Option<Value>,
  #[serde(flatten)]
  pub answers: Map<String, Value>,
}

fn required_user_id(raw: Option<&Value>) -> Result<Uuid, ApiError> {
  match raw {
    None | Some(Value::Null) => Err(Error::invalid("user_id is required").into()),
    Some(Value::String(s)) if s.trim().is_empty() => {
      Err(Error::invalid("user_id is required").into())
    }
    Some(Value::String(s)) => s
      .trim()
      .parse()
      .map_err(|_| Error::invalid("user_id must be a UUID").into()),
    Some(_) => Err(Error::invalid("user_id must be a UUID").into()),
  }
}

/// `POST /personal-info` — upserts the answers and returns them as stored.
pub async fn save_personal_info<S>(
  State(store): State<Arc<S>>,
  session: Option<Extension<SessionUser>>,
  body: Result<Json<PersonalInfoBody>, JsonRejection>,
) -> Result<Json<PersonalInfo>, ApiError>
where
  S: HealthStore,
{
  let Json(body) = body?;
  let user_id = required_user_id(body.user_id.as_ref())?;
  check_owner(&session, user_id)?;

  let response = SurveyResponse::from_value(SurveyType::PersonalInfo, Value::Object(body.answers))?;
  let record = store
    .put_survey(user_id, response, Precondition::Any)
    .await
    .map_err(store_err)?;

  record
    .response
    .as_ref()
    .and_then(SurveyResponse::as_personal_info)
    .cloned()
    .map(Json)
    .ok_or_else(|| Error::NotFound(format!("personal info for user {user_id}")).into())
}

// ─── Generic survey access ────────────────────────────────────────────────────

/// `GET /surveys/{user_id}/{survey_type}`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  session: Option<Extension<SessionUser>>,
  path: Result<Path<(Uuid, SurveyType)>, PathRejection>,
) -> Result<Response, ApiError>
where
  S: HealthStore,
{
  let Path((user_id, survey_type)) = path?;
  check_owner(&session, user_id)?;

  let record = store
    .get_survey(user_id, survey_type)
    .await
    .map_err(store_err)?;
  Ok(with_etag(SurveyView::of(record, true)))
}

/// Parse an `If-Match` header into a write precondition.
///
/// `"3"`, `3` and `W/"3"` all name version 3; `*` places no constraint.
pub fn parse_if_match(headers: &HeaderMap) -> Result<Precondition, ApiError> {
  let Some(raw) = headers.get(header::IF_MATCH) else {
    return Ok(Precondition::Any);
  };
  let raw = raw
    .to_str()
    .map_err(|_| ApiError::BadRequest("If-Match is not valid ASCII".into()))?
    .trim();
  if raw == "*" {
    return Ok(Precondition::Any);
  }
  raw
    .trim_start_matches("W/")
    .trim_matches('"')
    .parse()
    .map(Precondition::Version)
    .map_err(|_| ApiError::BadRequest(format!("If-Match {raw:?} is not a survey version")))
}

/// `PUT /surveys/{user_id}/{survey_type}` — body is the survey payload.
pub async fn put_one<S>(
  State(store): State<Arc<S>>,
  session: Option<Extension<SessionUser>>,
  path: Result<Path<(Uuid, SurveyType)>, PathRejection>,
  headers: HeaderMap,
  body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError>
where
  S: HealthStore,
{
  let Path((user_id, survey_type)) = path?;
  check_owner(&session, user_id)?;
  let Json(payload) = body?;

  let precondition = parse_if_match(&headers)?;
  let response = SurveyResponse::from_value(survey_type, payload)?;

  let record = match store.put_survey(user_id, response, precondition).await {
    Ok(record) => record,
    Err(e) => {
      let e: Error = e.into();
      return Err(match (e, precondition) {
        (Error::VersionConflict { .. }, Precondition::Version(v)) => ApiError::PreconditionFailed(
          format!("{survey_type} response for user {user_id} is no longer at version {v}"),
        ),
        (other, _) => ApiError::Core(other),
      });
    }
  };

  Ok(with_etag(SurveyView::of(Some(record), true)))
}
