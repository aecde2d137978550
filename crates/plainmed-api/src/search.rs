//! Handlers for the reference-topic endpoints.
//!
//! Search parameters arrive either as a query string (`GET /search`) or as a
//! JSON body (`POST /search`); both are validated into a
//! [`TopicQuery`] before the store is touched.

use std::sync::Arc;

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, PathRejection, QueryRejection},
  },
};
use plainmed_core::{
  Error,
  store::HealthStore,
  topic::{MedicalTopic, TopicQuery},
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, store_err};

#[derive(Debug, Deserialize, Default)]
pub struct SearchParams {
  /// Substring to look for in topic titles.
  #[serde(default)]
  pub query:     String,
  /// Exact topic language. Defaults to English.
  pub language:  Option<String>,
  pub n_results: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
  /// Backend that answered, e.g. `"supabase"`.
  pub source:  &'static str,
  pub results: Vec<MedicalTopic>,
}

async fn run<S: HealthStore>(store: &S, params: SearchParams) -> Result<SearchResults, ApiError> {
  let query = TopicQuery::new(&params.query, params.language.as_deref(), params.n_results)?;
  let results = store.search_topics(&query).await.map_err(store_err)?;
  Ok(SearchResults { source: store.backend_name(), results })
}

/// `GET /search?query=...[&language=...][&n_results=...]`
pub async fn by_query<S>(
  State(store): State<Arc<S>>,
  params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResults>, ApiError>
where
  S: HealthStore,
{
  let Query(params) = params?;
  Ok(Json(run(store.as_ref(), params).await?))
}

/// `POST /search` — body: `{"query":"...","language":"...","n_results":5}`
pub async fn by_body<S>(
  State(store): State<Arc<S>>,
  body: Result<Json<SearchParams>, JsonRejection>,
) -> Result<Json<SearchResults>, ApiError>
where
  S: HealthStore,
{
  let Json(params) = body?;
  Ok(Json(run(store.as_ref(), params).await?))
}

/// `GET /topics/{topic_id}` — the full topic with its summary unescaped.
pub async fn topic<S>(
  State(store): State<Arc<S>>,
  path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MedicalTopic>, ApiError>
where
  S: HealthStore,
{
  let Path(topic_id) = path?;
  let topic = store
    .get_topic(topic_id)
    .await
    .map_err(store_err)?
    .ok_or_else(|| Error::NotFound(format!("topic {topic_id} not found")))?;
  Ok(Json(topic.with_decoded_summary()))
}

#[derive(Debug, Serialize)]
pub struct Languages {
  pub languages: Vec<String>,
}

/// `GET /languages`
pub async fn languages<S>(State(store): State<Arc<S>>) -> Result<Json<Languages>, ApiError>
where
  S: HealthStore,
{
  let languages = store.list_languages().await.map_err(store_err)?;
  Ok(Json(Languages { languages }))
}
