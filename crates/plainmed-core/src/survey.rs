//! Survey responses: one JSON answer blob per user and survey category.
//!
//! The stored payload is opaque JSON, but every payload is parsed into the
//! [`SurveyResponse`] variant selected by its [`SurveyType`] before it is
//! accepted or returned.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, topic::MedicalTopic};

// ─── Survey type ─────────────────────────────────────────────────────────────

/// The survey category a response belongs to.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SurveyType {
  PersonalInfo,
  MedicalHistory,
}

impl SurveyType {
  /// Every survey a new user is seeded with.
  pub const ALL: [SurveyType; 2] = [SurveyType::PersonalInfo, SurveyType::MedicalHistory];
}

// ─── Personal info ───────────────────────────────────────────────────────────

/// Answers to the personal-info survey. Field names are camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PersonalInfo {
  /// e.g. `"25-34"` or `"65+"`.
  pub age_range: String,
  pub gender:    String,
  /// Preferred content language, e.g. `"English"` or `"Spanish"`.
  pub language:  String,
}

impl PersonalInfo {
  pub fn validate(&self) -> Result<()> {
    for (field, value) in [
      ("ageRange", &self.age_range),
      ("gender", &self.gender),
      ("language", &self.language),
    ] {
      if value.trim().is_empty() {
        return Err(Error::invalid(format!("{field} is required")));
      }
    }
    Ok(())
  }
}

// ─── Medical history ─────────────────────────────────────────────────────────

fn default_semantic_type() -> String { "MedlinePlus Topic".to_owned() }

fn default_sources() -> String { "MedlinePlus".to_owned() }

/// One entry of a medical history. `concept_id` is the de-duplication key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
  pub name:          String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name_es:       Option<String>,
  pub concept_id:    String,
  #[serde(default = "default_semantic_type")]
  pub semantic_type: String,
  #[serde(default = "default_sources")]
  pub sources:       String,
}

impl Condition {
  pub fn new(concept_id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      name:          name.into(),
      name_es:       None,
      concept_id:    concept_id.into(),
      semantic_type: default_semantic_type(),
      sources:       default_sources(),
    }
  }

  /// Build a condition referencing a reference-table topic.
  pub fn from_topic(topic: &MedicalTopic) -> Self {
    Self::new(topic.topic_id.to_string(), topic.title.clone())
  }

  pub fn validate(&self) -> Result<()> {
    if self.concept_id.trim().is_empty() {
      return Err(Error::invalid("condition concept_id is required"));
    }
    if self.name.trim().is_empty() {
      return Err(Error::invalid(format!(
        "condition {} is missing a name",
        self.concept_id
      )));
    }
    Ok(())
  }
}

/// Answers to the medical-history survey. `conditions` must be present, even
/// when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MedicalHistory {
  pub conditions: Vec<Condition>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub allergies:  Vec<String>,
}

impl MedicalHistory {
  pub fn contains(&self, concept_id: &str) -> bool {
    self.conditions.iter().any(|c| c.concept_id == concept_id)
  }

  /// Union the current conditions with `incoming`, keyed by `concept_id`.
  ///
  /// On a key collision the entry already present wins, including collisions
  /// among the existing entries themselves. Returns the number of entries
  /// appended from `incoming`.
  pub fn merge_conditions(&mut self, incoming: impl IntoIterator<Item = Condition>) -> usize {
    let mut seen = HashSet::new();
    let mut merged: Vec<Condition> = std::mem::take(&mut self.conditions)
      .into_iter()
      .filter(|c| seen.insert(c.concept_id.clone()))
      .collect();
    let kept = merged.len();

    merged.extend(incoming.into_iter().filter(|c| seen.insert(c.concept_id.clone())));

    let added = merged.len() - kept;
    self.conditions = merged;
    added
  }

  /// Drop every entry with `concept_id`. Returns whether anything was removed.
  pub fn remove_condition(&mut self, concept_id: &str) -> bool {
    let before = self.conditions.len();
    self.conditions.retain(|c| c.concept_id != concept_id);
    self.conditions.len() != before
  }

  pub fn validate(&self) -> Result<()> {
    self.conditions.iter().try_for_each(Condition::validate)
  }
}

// ─── Tagged payload ──────────────────────────────────────────────────────────

/// A schema-checked survey payload. Serialises as the bare inner object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SurveyResponse {
  PersonalInfo(PersonalInfo),
  MedicalHistory(MedicalHistory),
}

impl SurveyResponse {
  pub fn survey_type(&self) -> SurveyType {
    match self {
      Self::PersonalInfo(_) => SurveyType::PersonalInfo,
      Self::MedicalHistory(_) => SurveyType::MedicalHistory,
    }
  }

  /// Parse and validate a raw payload as the variant for `survey_type`.
  pub fn from_value(survey_type: SurveyType, value: Value) -> Result<Self> {
    let parsed = match survey_type {
      SurveyType::PersonalInfo => serde_json::from_value(value).map(Self::PersonalInfo),
      SurveyType::MedicalHistory => serde_json::from_value(value).map(Self::MedicalHistory),
    }
    .map_err(|e| Error::invalid(format!("malformed {survey_type} payload: {e}")))?;

    parsed.validate()?;
    Ok(parsed)
  }

  pub fn to_value(&self) -> Result<Value> { Ok(serde_json::to_value(self)?) }

  pub fn validate(&self) -> Result<()> {
    match self {
      Self::PersonalInfo(p) => p.validate(),
      Self::MedicalHistory(h) => h.validate(),
    }
  }

  pub fn as_personal_info(&self) -> Option<&PersonalInfo> {
    match self {
      Self::PersonalInfo(p) => Some(p),
      Self::MedicalHistory(_) => None,
    }
  }

  pub fn as_medical_history(&self) -> Option<&MedicalHistory> {
    match self {
      Self::MedicalHistory(h) => Some(h),
      Self::PersonalInfo(_) => None,
    }
  }
}

impl From<PersonalInfo> for SurveyResponse {
  fn from(p: PersonalInfo) -> Self { Self::PersonalInfo(p) }
}

impl From<MedicalHistory> for SurveyResponse {
  fn from(h: MedicalHistory) -> Self { Self::MedicalHistory(h) }
}

// ─── Stored record ───────────────────────────────────────────────────────────

/// The single row stored per `(user_id, survey_type)`.
///
/// `response` is `None` for a row seeded at account creation whose form has
/// not been filled in yet. `version` starts at 1 and increases by one on every
/// write; conditional writes compare against it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyRecord {
  pub user_id:     Uuid,
  pub survey_type: SurveyType,
  pub response:    Option<SurveyResponse>,
  pub version:     i64,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

impl SurveyRecord {
  pub fn is_completed(&self) -> bool { self.response.is_some() }
}
