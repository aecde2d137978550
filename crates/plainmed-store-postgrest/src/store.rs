//! [`PostgrestStore`] — the hosted implementation of [`HealthStore`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use plainmed_core::{
  records::MAX_WRITE_ATTEMPTS,
  store::{HealthStore, Precondition},
  survey::{SurveyRecord, SurveyResponse, SurveyType},
  topic::{MedicalTopic, TopicQuery},
};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
  Error, Result,
  client::{PostgrestConfig, RestClient},
};

const SURVEYS: &str = "survey_responses";
const TOPICS: &str = "MEDLINEPLUS";

/// Search projection. `sites` is only returned by single-topic reads.
const SEARCH_COLUMNS: &str = "topic_id,title,language,url,meta_desc,full_summary,\
   aliases,mesh_headings,groups,primary_institute,date_created";

/// Rows requested per page when scanning the topic table.
const LANGUAGE_PAGE: usize = 1000;

const RETURN_ROWS: &str = "return=representation";
const INSERT_IF_ABSENT: &str = "resolution=ignore-duplicates,return=representation";

// ─── Wire rows ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SurveyRow {
  user_id:     Uuid,
  survey_type: SurveyType,
  #[serde(default)]
  response:    Option<Value>,
  #[serde(default = "first_version")]
  version:     i64,
  created_at:  DateTime<Utc>,
  updated_at:  DateTime<Utc>,
}

fn first_version() -> i64 { 1 }

impl SurveyRow {
  fn into_record(self) -> Result<SurveyRecord> {
    let survey_type = self.survey_type;
    let response = self
      .response
      .map(|v| SurveyResponse::from_value(survey_type, v))
      .transpose()
      .map_err(|e| Error::Corrupt(e.to_string()))?;
    Ok(SurveyRecord {
      user_id: self.user_id,
      survey_type,
      response,
      version: self.version,
      created_at: self.created_at,
      updated_at: self.updated_at,
    })
  }
}

#[derive(Debug, Serialize)]
struct NewSurveyRow<'a> {
  user_id:     Uuid,
  survey_type: SurveyType,
  response:    Option<&'a SurveyResponse>,
  version:     i64,
  created_at:  DateTime<Utc>,
  updated_at:  DateTime<Utc>,
}

impl<'a> NewSurveyRow<'a> {
  fn new(user_id: Uuid, survey_type: SurveyType, response: Option<&'a SurveyResponse>) -> Self {
    let now = Utc::now();
    Self { user_id, survey_type, response, version: 1, created_at: now, updated_at: now }
  }
}

#[derive(Debug, Deserialize)]
struct LanguageRow {
  #[serde(default)]
  language: Option<String>,
}

/// Escape `LIKE` metacharacters. PostgREST itself turns `*` into `%`;
/// [`TopicQuery`] keeps `*` out of the text.
fn ilike_pattern(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len() + 2);
  escaped.push('*');
  for c in text.chars() {
    if matches!(c, '%' | '_' | '\\') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped.push('*');
  escaped
}

fn eq(v: impl std::fmt::Display) -> String { format!("eq.{v}") }

// ─── Store ───────────────────────────────────────────────────────────────────

/// A health store backed by a hosted Supabase project.
#[derive(Clone)]
pub struct PostgrestStore {
  pub(crate) client: RestClient,
}

impl PostgrestStore {
  pub fn new(config: &PostgrestConfig) -> Result<Self> {
    Ok(Self { client: RestClient::new(config)? })
  }

  fn single_record(
    rows: Vec<SurveyRow>,
    user_id: Uuid,
    survey_type: SurveyType,
  ) -> Result<SurveyRecord> {
    match rows.into_iter().next() {
      Some(row) => row.into_record(),
      None => Err(Error::Conflict { user_id, survey_type }),
    }
  }

  async fn insert_absent(&self, user_id: Uuid, response: &SurveyResponse) -> Result<SurveyRecord> {
    let survey_type = response.survey_type();
    let url = self.client.table_url(SURVEYS);
    let rows: Vec<SurveyRow> = RestClient::send_json(
      self
        .client
        .request(Method::POST, &url, None)
        .query(&[("on_conflict", "user_id,survey_type")])
        .header("Prefer", INSERT_IF_ABSENT)
        .json(&NewSurveyRow::new(user_id, survey_type, Some(response))),
    )
    .await?;
    Self::single_record(rows, user_id, survey_type)
  }

  async fn update_at_version(
    &self,
    user_id: Uuid,
    response: &SurveyResponse,
    expected: i64,
  ) -> Result<SurveyRecord> {
    let survey_type = response.survey_type();
    let url = self.client.table_url(SURVEYS);
    let rows: Vec<SurveyRow> = RestClient::send_json(
      self
        .client
        .request(Method::PATCH, &url, None)
        .query(&[
          ("user_id", eq(user_id)),
          ("survey_type", eq(survey_type)),
          ("version", eq(expected)),
        ])
        .header("Prefer", RETURN_ROWS)
        .json(&json!({
          "response":   response,
          "version":    expected + 1,
          "updated_at": Utc::now(),
        })),
    )
    .await?;
    Self::single_record(rows, user_id, survey_type)
  }

  /// Unconditional write expressed as conditional ones, so `version` keeps
  /// increasing by exactly one per write.
  async fn overwrite(&self, user_id: Uuid, response: &SurveyResponse) -> Result<SurveyRecord> {
    let survey_type = response.survey_type();
    for _ in 0..MAX_WRITE_ATTEMPTS {
      let written = match self.get_survey(user_id, survey_type).await? {
        None => self.insert_absent(user_id, response).await,
        Some(current) => self.update_at_version(user_id, response, current.version).await,
      };
      match written {
        Err(Error::Conflict { .. }) => continue,
        other => return other,
      }
    }
    Err(Error::Conflict { user_id, survey_type })
  }
}

// ─── HealthStore impl ────────────────────────────────────────────────────────

impl HealthStore for PostgrestStore {
  type Error = Error;

  fn backend_name(&self) -> &'static str { "supabase" }

  async fn get_survey(
    &self,
    user_id: Uuid,
    survey_type: SurveyType,
  ) -> Result<Option<SurveyRecord>> {
    let url = self.client.table_url(SURVEYS);
    let rows: Vec<SurveyRow> = self
      .client
      .read("get_survey", || {
        self.client.request(Method::GET, &url, None).query(&[
          ("select", "*".to_owned()),
          ("user_id", eq(user_id)),
          ("survey_type", eq(survey_type)),
          ("limit", "1".to_owned()),
        ])
      })
      .await?;

    tracing::debug!(%user_id, %survey_type, found = !rows.is_empty(), "hosted survey read");
    rows.into_iter().next().map(SurveyRow::into_record).transpose()
  }

  async fn put_survey(
    &self,
    user_id: Uuid,
    response: SurveyResponse,
    precondition: Precondition,
  ) -> Result<SurveyRecord> {
    let record = match precondition {
      Precondition::Any => self.overwrite(user_id, &response).await?,
      Precondition::Absent => self.insert_absent(user_id, &response).await?,
      Precondition::Version(v) => self.update_at_version(user_id, &response, v).await?,
    };
    tracing::debug!(
      %user_id,
      survey_type = %record.survey_type,
      version = record.version,
      "hosted survey written"
    );
    Ok(record)
  }

  async fn seed_surveys(&self, user_id: Uuid) -> Result<usize> {
    let rows: Vec<NewSurveyRow<'_>> = SurveyType::ALL
      .into_iter()
      .map(|t| NewSurveyRow::new(user_id, t, None))
      .collect();

    let url = self.client.table_url(SURVEYS);
    let created: Vec<Value> = RestClient::send_json(
      self
        .client
        .request(Method::POST, &url, None)
        .query(&[("on_conflict", "user_id,survey_type")])
        .header("Prefer", INSERT_IF_ABSENT)
        .json(&rows),
    )
    .await?;

    Ok(created.len())
  }

  async fn search_topics(&self, query: &TopicQuery) -> Result<Vec<MedicalTopic>> {
    let url = self.client.table_url(TOPICS);
    let params = [
      ("select", SEARCH_COLUMNS.to_owned()),
      ("language", eq(&query.language)),
      ("title", format!("ilike.{}", ilike_pattern(&query.text))),
      ("order", "topic_id.asc".to_owned()),
      ("limit", query.limit.to_string()),
    ];

    let topics: Vec<MedicalTopic> = self
      .client
      .read("search_topics", || {
        self.client.request(Method::GET, &url, None).query(&params)
      })
      .await?;

    tracing::debug!(text = %query.text, hits = topics.len(), "hosted topic search");
    Ok(topics)
  }

  async fn get_topic(&self, topic_id: i64) -> Result<Option<MedicalTopic>> {
    let url = self.client.table_url(TOPICS);
    let topics: Vec<MedicalTopic> = self
      .client
      .read("get_topic", || {
        self.client.request(Method::GET, &url, None).query(&[
          ("select", "*".to_owned()),
          ("topic_id", eq(topic_id)),
          ("limit", "1".to_owned()),
        ])
      })
      .await?;
    Ok(topics.into_iter().next())
  }

  async fn list_languages(&self) -> Result<Vec<String>> {
    let url = self.client.table_url(TOPICS);
    let mut distinct = BTreeSet::new();
    let mut offset = 0usize;

    // The server may cap a response below the requested page size, so only
    // an empty page ends the scan.
    loop {
      let rows: Vec<LanguageRow> = self
        .client
        .read("list_languages", || {
          self.client.request(Method::GET, &url, None).query(&[
            ("select", "language".to_owned()),
            ("order", "topic_id.asc".to_owned()),
            ("limit", LANGUAGE_PAGE.to_string()),
            ("offset", offset.to_string()),
          ])
        })
        .await?;
      if rows.is_empty() {
        break;
      }
      offset += rows.len();
      distinct.extend(
        rows
          .into_iter()
          .filter_map(|r| r.language)
          .filter(|l| !l.trim().is_empty()),
      );
    }

    tracing::debug!(rows = offset, languages = distinct.len(), "hosted languages scanned");
    Ok(distinct.into_iter().collect())
  }
}
