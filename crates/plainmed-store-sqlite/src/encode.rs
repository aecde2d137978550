//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase, survey types
//! their snake_case names, and structured values compact JSON.

use chrono::{DateTime, Utc};
use plainmed_core::{
  survey::{SurveyRecord, SurveyResponse, SurveyType},
  topic::{Institute, MedicalTopic, Site},
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_survey_type(t: SurveyType) -> &'static str {
  match t {
    SurveyType::PersonalInfo => "personal_info",
    SurveyType::MedicalHistory => "medical_history",
  }
}

pub fn decode_survey_type(s: &str) -> Result<SurveyType> {
  s.parse()
    .map_err(|_| Error::Corrupt(format!("unknown survey type: {s:?}")))
}

// ─── Survey payloads ─────────────────────────────────────────────────────────

pub fn encode_response(r: &SurveyResponse) -> Result<String> {
  Ok(serde_json::to_string(r)?)
}

pub fn decode_response(survey_type: SurveyType, s: &str) -> Result<SurveyResponse> {
  let value: serde_json::Value = serde_json::from_str(s)?;
  SurveyResponse::from_value(survey_type, value).map_err(|e| Error::Corrupt(e.to_string()))
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_json<T: serde::Serialize>(v: &T) -> Result<String> {
  Ok(serde_json::to_string(v)?)
}

fn decode_json<T: DeserializeOwned + Default>(s: Option<&str>) -> Result<T> {
  match s {
    None => Ok(T::default()),
    Some(s) if s.trim().is_empty() => Ok(T::default()),
    Some(s) => Ok(serde_json::from_str(s)?),
  }
}

// ─── Raw row types ───────────────────────────────────────────────────────────

/// A `survey_responses` row as read from SQLite, before decoding.
pub struct RawSurveyRecord {
  pub user_id:     String,
  pub survey_type: String,
  pub response:    Option<String>,
  pub version:     i64,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawSurveyRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:     row.get(0)?,
      survey_type: row.get(1)?,
      response:    row.get(2)?,
      version:     row.get(3)?,
      created_at:  row.get(4)?,
      updated_at:  row.get(5)?,
    })
  }

  pub fn into_record(self) -> Result<SurveyRecord> {
    let survey_type = decode_survey_type(&self.survey_type)?;
    Ok(SurveyRecord {
      user_id: decode_uuid(&self.user_id)?,
      survey_type,
      response: self
        .response
        .as_deref()
        .map(|s| decode_response(survey_type, s))
        .transpose()?,
      version: self.version,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// A `medical_topics` row as read from SQLite, before decoding.
pub struct RawTopic {
  pub topic_id:          i64,
  pub title:             String,
  pub language:          String,
  pub url:               Option<String>,
  pub meta_desc:         Option<String>,
  pub full_summary:      Option<String>,
  pub aliases:           Option<String>,
  pub mesh_headings:     Option<String>,
  pub topic_groups:      Option<String>,
  pub primary_institute: Option<String>,
  pub sites:             Option<String>,
  pub date_created:      Option<String>,
}

impl RawTopic {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      topic_id:          row.get(0)?,
      title:             row.get(1)?,
      language:          row.get(2)?,
      url:               row.get(3)?,
      meta_desc:         row.get(4)?,
      full_summary:      row.get(5)?,
      aliases:           row.get(6)?,
      mesh_headings:     row.get(7)?,
      topic_groups:      row.get(8)?,
      primary_institute: row.get(9)?,
      sites:             row.get(10)?,
      date_created:      row.get(11)?,
    })
  }

  pub fn into_topic(self) -> Result<MedicalTopic> {
    let primary_institute: Option<Institute> = decode_json(self.primary_institute.as_deref())?;
    let sites: Vec<Site> = decode_json(self.sites.as_deref())?;
    Ok(MedicalTopic {
      topic_id: self.topic_id,
      title: self.title,
      language: self.language,
      url: self.url,
      meta_desc: self.meta_desc,
      full_summary: self.full_summary,
      aliases: decode_json(self.aliases.as_deref())?,
      mesh_headings: decode_json(self.mesh_headings.as_deref())?,
      groups: decode_json(self.topic_groups.as_deref())?,
      primary_institute,
      sites,
      date_created: self.date_created,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn survey_type_encoding_matches_serde_names() {
    for t in SurveyType::ALL {
      assert_eq!(encode_survey_type(t), t.as_ref());
      assert_eq!(decode_survey_type(encode_survey_type(t)).unwrap(), t);
    }
  }

  #[test]
  fn unknown_survey_type_is_corrupt() {
    assert!(matches!(decode_survey_type("diet"), Err(Error::Corrupt(_))));
  }

  #[test]
  fn blank_json_column_decodes_to_default() {
    let v: Vec<String> = decode_json(Some("")).unwrap();
    assert!(v.is_empty());
    let v: Option<Institute> = decode_json(None).unwrap();
    assert!(v.is_none());
  }
}
