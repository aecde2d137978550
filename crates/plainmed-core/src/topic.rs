//! MedicalTopic: read-only reference records and the search query over them.

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Error, Result};

/// Language searched when the caller does not name one.
pub const DEFAULT_LANGUAGE: &str = "English";
/// Result count when the caller does not name one.
pub const DEFAULT_LIMIT: usize = 5;
/// Upper bound on a single search, whatever the caller asks for.
pub const MAX_LIMIT: usize = 50;

// ─── Topic ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institute {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub url:  String,
}

/// An external page linked from a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
  #[serde(default)]
  pub title: String,
  pub url:   String,
}

/// One row of the reference table. Never written by the application.
///
/// Array and object columns are accepted either as JSON values or as
/// JSON-encoded text, since the hosted table stores some of them as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalTopic {
  pub topic_id:          i64,
  pub title:             String,
  #[serde(default)]
  pub language:          String,
  #[serde(default)]
  pub url:               Option<String>,
  #[serde(default)]
  pub meta_desc:         Option<String>,
  #[serde(default)]
  pub full_summary:      Option<String>,
  #[serde(default, deserialize_with = "value_or_json_text")]
  pub aliases:           Vec<String>,
  #[serde(default, deserialize_with = "value_or_json_text")]
  pub mesh_headings:     Vec<String>,
  #[serde(default, deserialize_with = "value_or_json_text")]
  pub groups:            Vec<String>,
  #[serde(default, deserialize_with = "value_or_json_text")]
  pub primary_institute: Option<Institute>,
  /// Only populated on single-topic reads; search results omit it.
  #[serde(
    default,
    deserialize_with = "value_or_json_text",
    skip_serializing_if = "Vec::is_empty"
  )]
  pub sites:             Vec<Site>,
  #[serde(default)]
  pub date_created:      Option<String>,
}

impl MedicalTopic {
  /// A topic with only the mandatory fields set.
  pub fn new(topic_id: i64, title: impl Into<String>, language: impl Into<String>) -> Self {
    Self {
      topic_id,
      title: title.into(),
      language: language.into(),
      url: None,
      meta_desc: None,
      full_summary: None,
      aliases: vec![],
      mesh_headings: vec![],
      groups: vec![],
      primary_institute: None,
      sites: vec![],
      date_created: None,
    }
  }

  /// Replace the HTML entities the reference data escapes in `full_summary`.
  pub fn with_decoded_summary(mut self) -> Self {
    self.full_summary = self.full_summary.as_deref().map(decode_html_entities);
    self
  }
}

/// Decode the four entities present in summary markup. `&amp;` goes last so
/// `&amp;lt;` decodes to the literal text `&lt;`.
pub fn decode_html_entities(s: &str) -> String {
  s.replace("&lt;", "<")
    .replace("&gt;", ">")
    .replace("&quot;", "\"")
    .replace("&amp;", "&")
}

fn value_or_json_text<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned + Default,
{
  use serde::de::Error as _;

  match Value::deserialize(deserializer)? {
    Value::Null => Ok(T::default()),
    Value::String(s) if s.trim().is_empty() => Ok(T::default()),
    Value::String(s) => serde_json::from_str(&s).map_err(D::Error::custom),
    other => serde_json::from_value(other).map_err(D::Error::custom),
  }
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// A validated search over topic titles.
///
/// Matching is a case-insensitive substring test on `title`, restricted to
/// rows whose `language` equals `language` exactly. `text` never contains
/// `*`, which the hosted REST filter syntax always reads as a wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicQuery {
  pub text:     String,
  pub language: String,
  pub limit:    usize,
}

impl TopicQuery {
  /// Validate raw request parameters. Blank `language` falls back to
  /// [`DEFAULT_LANGUAGE`]; `limit` is capped at [`MAX_LIMIT`].
  pub fn new(text: &str, language: Option<&str>, limit: Option<i64>) -> Result<Self> {
    let text = text.trim();
    if text.is_empty() {
      return Err(Error::invalid("query must not be empty"));
    }
    if text.contains('*') {
      return Err(Error::invalid("query must not contain '*'"));
    }

    let language = language
      .map(str::trim)
      .filter(|l| !l.is_empty())
      .unwrap_or(DEFAULT_LANGUAGE)
      .to_owned();

    let limit = match limit {
      None => DEFAULT_LIMIT,
      Some(n) if n <= 0 => {
        return Err(Error::invalid("n_results must be greater than zero"));
      }
      Some(n) => usize::try_from(n).unwrap_or(MAX_LIMIT).min(MAX_LIMIT),
    };

    Ok(Self { text: text.to_owned(), language, limit })
  }

  pub fn matches(&self, topic: &MedicalTopic) -> bool {
    topic.language == self.language
      && topic.title.to_lowercase().contains(&self.text.to_lowercase())
  }
}
