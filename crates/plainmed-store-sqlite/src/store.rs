//! [`SqliteStore`] — the SQLite implementation of [`HealthStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, functions::FunctionFlags};
use uuid::Uuid;

use plainmed_core::{
  store::{HealthStore, Precondition},
  survey::{SurveyRecord, SurveyResponse, SurveyType},
  topic::{MedicalTopic, TopicQuery},
};

use crate::{
  Error, Result,
  encode::{
    RawSurveyRecord, RawTopic, encode_dt, encode_json, encode_response, encode_survey_type,
    encode_uuid,
  },
  schema::SCHEMA,
};

const RECORD_COLUMNS: &str = "user_id, survey_type, response, version, created_at, updated_at";

/// Every topic column, in [`RawTopic::from_row`] order.
const TOPIC_COLUMNS: &str = "topic_id, title, language, url, meta_desc, full_summary,
   aliases, mesh_headings, topic_groups, primary_institute, sites, date_created";

/// The search projection: same layout, but `sites` is never returned.
const SEARCH_COLUMNS: &str = "topic_id, title, language, url, meta_desc, full_summary,
   aliases, mesh_headings, topic_groups, primary_institute, '[]', date_created";

/// SQL function lowercasing with full Unicode case mapping; the built-in
/// `lower()` and `LIKE` fold ASCII only.
const UNICODE_LOWER: &str = "unicode_lower";

fn register_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
  conn.create_scalar_function(
    UNICODE_LOWER,
    1,
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
    |ctx| {
      let text: Option<String> = ctx.get(0)?;
      Ok(text.map(|t| t.to_lowercase()))
    },
  )
}

/// Lowercase `text` and escape `LIKE` metacharacters so it matches literally.
fn like_pattern(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len() + 2);
  escaped.push('%');
  for c in text.to_lowercase().chars() {
    if matches!(c, '%' | '_' | '\\') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped.push('%');
  escaped
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A health store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        register_functions(conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Load reference topics, replacing any row with the same `topic_id`.
  /// Returns the number of topics written.
  pub async fn import_topics(&self, topics: Vec<MedicalTopic>) -> Result<usize> {
    let rows = topics
      .iter()
      .map(|t| -> Result<_> {
        Ok((
          t.topic_id,
          t.title.clone(),
          t.language.clone(),
          t.url.clone(),
          t.meta_desc.clone(),
          t.full_summary.clone(),
          encode_json(&t.aliases)?,
          encode_json(&t.mesh_headings)?,
          encode_json(&t.groups)?,
          t.primary_institute.as_ref().map(encode_json).transpose()?,
          encode_json(&t.sites)?,
          t.date_created.clone(),
        ))
      })
      .collect::<Result<Vec<_>>>()?;

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
          let mut stmt = tx.prepare(&format!(
            "INSERT OR REPLACE INTO medical_topics ({TOPIC_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
          ))?;
          for r in &rows {
            written += stmt.execute(rusqlite::params![
              r.0, r.1, r.2, r.3, r.4, r.5, r.6, r.7, r.8, r.9, r.10, r.11,
            ])?;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    tracing::info!(written, "imported reference topics");
    Ok(written)
  }
}

// ─── HealthStore impl ────────────────────────────────────────────────────────

impl HealthStore for SqliteStore {
  type Error = Error;

  fn backend_name(&self) -> &'static str { "sqlite" }

  // ── Survey responses ──────────────────────────────────────────────────────

  async fn get_survey(
    &self,
    user_id: Uuid,
    survey_type: SurveyType,
  ) -> Result<Option<SurveyRecord>> {
    let user_str = encode_uuid(user_id);
    let type_str = encode_survey_type(survey_type);

    let raw: Option<RawSurveyRecord> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {RECORD_COLUMNS} FROM survey_responses
                 WHERE user_id = ?1 AND survey_type = ?2"
              ),
              rusqlite::params![user_str, type_str],
              RawSurveyRecord::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSurveyRecord::into_record).transpose()
  }

  async fn put_survey(
    &self,
    user_id: Uuid,
    response: SurveyResponse,
    precondition: Precondition,
  ) -> Result<SurveyRecord> {
    let survey_type  = response.survey_type();
    let user_str     = encode_uuid(user_id);
    let type_str     = encode_survey_type(survey_type);
    let payload      = encode_response(&response)?;
    let now_str      = encode_dt(Utc::now());

    let raw: Option<RawSurveyRecord> = self
      .conn
      .call(move |conn| {
        let row = match precondition {
          Precondition::Any => conn
            .query_row(
              &format!(
                "INSERT INTO survey_responses
                   (user_id, survey_type, response, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?4)
                 ON CONFLICT (user_id, survey_type) DO UPDATE SET
                   response   = excluded.response,
                   version    = survey_responses.version + 1,
                   updated_at = excluded.updated_at
                 RETURNING {RECORD_COLUMNS}"
              ),
              rusqlite::params![user_str, type_str, payload, now_str],
              RawSurveyRecord::from_row,
            )
            .optional()?,
          Precondition::Absent => conn
            .query_row(
              &format!(
                "INSERT INTO survey_responses
                   (user_id, survey_type, response, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?4)
                 ON CONFLICT (user_id, survey_type) DO NOTHING
                 RETURNING {RECORD_COLUMNS}"
              ),
              rusqlite::params![user_str, type_str, payload, now_str],
              RawSurveyRecord::from_row,
            )
            .optional()?,
          Precondition::Version(expected) => conn
            .query_row(
              &format!(
                "UPDATE survey_responses
                 SET response = ?3, version = version + 1, updated_at = ?4
                 WHERE user_id = ?1 AND survey_type = ?2 AND version = ?5
                 RETURNING {RECORD_COLUMNS}"
              ),
              rusqlite::params![user_str, type_str, payload, now_str, expected],
              RawSurveyRecord::from_row,
            )
            .optional()?,
        };
        Ok(row)
      })
      .await?;

    match raw {
      Some(raw) => {
        let record = raw.into_record()?;
        tracing::debug!(%user_id, %survey_type, version = record.version, "survey written");
        Ok(record)
      }
      None => Err(Error::Conflict { user_id, survey_type }),
    }
  }

  async fn seed_surveys(&self, user_id: Uuid) -> Result<usize> {
    let user_str = encode_uuid(user_id);
    let now_str  = encode_dt(Utc::now());

    let created = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut created = 0;
        for survey_type in SurveyType::ALL {
          created += tx.execute(
            "INSERT INTO survey_responses
               (user_id, survey_type, response, version, created_at, updated_at)
             VALUES (?1, ?2, NULL, 1, ?3, ?3)
             ON CONFLICT (user_id, survey_type) DO NOTHING",
            rusqlite::params![user_str, encode_survey_type(survey_type), now_str],
          )?;
        }
        tx.commit()?;
        Ok(created)
      })
      .await?;

    Ok(created)
  }

  // ── Reference topics ──────────────────────────────────────────────────────

  async fn search_topics(&self, query: &TopicQuery) -> Result<Vec<MedicalTopic>> {
    let pattern   = like_pattern(&query.text);
    let language  = query.language.clone();
    let limit_val = query.limit as i64;

    let raws: Vec<RawTopic> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SEARCH_COLUMNS} FROM medical_topics
           WHERE language = ?1 AND {UNICODE_LOWER}(title) LIKE ?2 ESCAPE '\\'
           ORDER BY topic_id
           LIMIT ?3"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![language, pattern, limit_val],
            RawTopic::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTopic::into_topic).collect()
  }

  async fn get_topic(&self, topic_id: i64) -> Result<Option<MedicalTopic>> {
    let raw: Option<RawTopic> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {TOPIC_COLUMNS} FROM medical_topics WHERE topic_id = ?1"),
              rusqlite::params![topic_id],
              RawTopic::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTopic::into_topic).transpose()
  }

  async fn list_languages(&self) -> Result<Vec<String>> {
    let languages = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT language FROM medical_topics
           WHERE language <> ''
           ORDER BY language",
        )?;
        let rows = stmt
          .query_map([], |row| row.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(languages)
  }
}
