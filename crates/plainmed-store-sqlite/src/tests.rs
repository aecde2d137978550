//! Integration tests for `SqliteStore` against an in-memory database.

use plainmed_core::{
  records,
  store::{HealthStore, Precondition},
  survey::{Condition, MedicalHistory, PersonalInfo, SurveyResponse, SurveyType},
  topic::{Institute, MedicalTopic, Site, TopicQuery},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn personal_info() -> SurveyResponse {
  SurveyResponse::PersonalInfo(PersonalInfo {
    age_range: "25-34".into(),
    gender:    "female".into(),
    language:  "English".into(),
  })
}

fn topic(id: i64, title: &str, language: &str) -> MedicalTopic {
  MedicalTopic::new(id, title, language)
}

async fn seeded_topics() -> SqliteStore {
  let s = store().await;
  let mut detailed = topic(1, "Diabetes", "English");
  detailed.aliases = vec!["Diabetes mellitus".into()];
  detailed.primary_institute = Some(Institute {
    name: "NIDDK".into(),
    url:  "https://www.niddk.nih.gov".into(),
  });
  detailed.sites = vec![Site {
    title: "Diabetes basics".into(),
    url:   "https://example.org/diabetes".into(),
  }];

  s.import_topics(vec![
    detailed,
    topic(2, "Diabetes Type 1", "English"),
    topic(3, "Diabetes en el embarazo", "Spanish"),
    topic(4, "Prediabetes", "English"),
    topic(5, "Asthma", "English"),
    topic(6, "Diabetic Eye Problems", "English"),
  ])
  .await
  .unwrap();
  s
}

// ─── Survey responses ────────────────────────────────────────────────────────

#[tokio::test]
async fn get_before_any_write_returns_none() {
  let s = store().await;
  let got = s.get_survey(Uuid::new_v4(), SurveyType::PersonalInfo).await.unwrap();
  assert!(got.is_none());
}

#[tokio::test]
async fn upsert_then_get_returns_same_payload() {
  let s = store().await;
  let user = Uuid::new_v4();

  let written = s.put_survey(user, personal_info(), Precondition::Any).await.unwrap();
  assert_eq!(written.version, 1);

  let fetched = s.get_survey(user, SurveyType::PersonalInfo).await.unwrap().unwrap();
  assert!(fetched.is_completed());
  assert_eq!(fetched.response, Some(personal_info()));
  assert_eq!(fetched.user_id, user);
}

#[tokio::test]
async fn upsert_twice_keeps_one_row_and_bumps_version() {
  let s = store().await;
  let user = Uuid::new_v4();

  s.put_survey(user, personal_info(), Precondition::Any).await.unwrap();
  let second = s.put_survey(user, personal_info(), Precondition::Any).await.unwrap();
  assert_eq!(second.version, 2);

  assert_eq!(s.row_count(user).await, 1);
}

#[tokio::test]
async fn absent_precondition_fails_when_row_exists() {
  let s = store().await;
  let user = Uuid::new_v4();

  s.put_survey(user, personal_info(), Precondition::Absent).await.unwrap();
  let err = s
    .put_survey(user, personal_info(), Precondition::Absent)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Conflict { survey_type: SurveyType::PersonalInfo, .. }));
}

#[tokio::test]
async fn version_precondition_rejects_stale_writer() {
  let s = store().await;
  let user = Uuid::new_v4();
  s.seed_surveys(user).await.unwrap();

  let history = SurveyResponse::MedicalHistory(MedicalHistory {
    conditions: vec![Condition::new("AS001", "Asthma")],
    allergies:  vec![],
  });

  let fresh = s
    .put_survey(user, history.clone(), Precondition::Version(1))
    .await
    .unwrap();
  assert_eq!(fresh.version, 2);

  let err = s
    .put_survey(user, history, Precondition::Version(1))
    .await
    .unwrap_err();
  assert!(matches!(
    plainmed_core::Error::from(err),
    plainmed_core::Error::VersionConflict { .. }
  ));
}

#[tokio::test]
async fn seeding_twice_creates_rows_once() {
  let s = store().await;
  let user = Uuid::new_v4();

  assert_eq!(s.seed_surveys(user).await.unwrap(), 2);
  assert_eq!(s.seed_surveys(user).await.unwrap(), 0);
  assert_eq!(s.row_count(user).await, 2);

  let personal = s.get_survey(user, SurveyType::PersonalInfo).await.unwrap().unwrap();
  assert!(!personal.is_completed());
}

#[tokio::test]
async fn seeding_keeps_existing_answers() {
  let s = store().await;
  let user = Uuid::new_v4();
  s.put_survey(user, personal_info(), Precondition::Any).await.unwrap();

  assert_eq!(s.seed_surveys(user).await.unwrap(), 1);
  let personal = s.get_survey(user, SurveyType::PersonalInfo).await.unwrap().unwrap();
  assert_eq!(personal.response, Some(personal_info()));
}

#[tokio::test]
async fn adding_condition_twice_leaves_one_entry() {
  let s = store().await;
  let user = Uuid::new_v4();
  records::initialize_user(&s, user).await.unwrap();

  let asthma = Condition::new("AS001", "Asthma");
  records::add_conditions(&s, user, vec![asthma.clone()]).await.unwrap();
  records::add_conditions(&s, user, vec![asthma]).await.unwrap();

  let history = records::load_history(&s, user).await.unwrap();
  assert_eq!(
    history.conditions.iter().filter(|c| c.concept_id == "AS001").count(),
    1
  );
}

// ─── Reference topics ────────────────────────────────────────────────────────

#[tokio::test]
async fn search_matches_title_substring_case_insensitively() {
  let s = seeded_topics().await;
  let q = TopicQuery::new("DIABETES", Some("English"), Some(5)).unwrap();

  let results = s.search_topics(&q).await.unwrap();
  let ids: Vec<i64> = results.iter().map(|t| t.topic_id).collect();
  assert_eq!(ids, vec![1, 2, 4]);
  assert!(results.iter().all(|t| q.matches(t)));
}

#[tokio::test]
async fn search_respects_language_and_limit() {
  let s = seeded_topics().await;

  let q = TopicQuery::new("diabetes", Some("Spanish"), None).unwrap();
  let results = s.search_topics(&q).await.unwrap();
  assert_eq!(results.len(), 1);
  assert_eq!(results[0].topic_id, 3);

  let q = TopicQuery::new("diabet", Some("English"), Some(2)).unwrap();
  assert_eq!(s.search_topics(&q).await.unwrap().len(), 2);
}

#[tokio::test]
async fn search_folds_accented_capitals() {
  let s = store().await;
  s.import_topics(vec![
    topic(10, "Úlceras por presión", "Spanish"),
    topic(11, "Ácido fólico", "Spanish"),
  ])
  .await
  .unwrap();

  for text in ["úlceras", "ÚLCERAS", "PRESIÓN"] {
    let q = TopicQuery::new(text, Some("Spanish"), None).unwrap();
    let hits = s.search_topics(&q).await.unwrap();
    assert_eq!(hits.len(), 1, "{text}");
    assert_eq!(hits[0].topic_id, 10);
    assert!(q.matches(&hits[0]));
  }
}

#[tokio::test]
async fn search_with_no_match_is_empty() {
  let s = seeded_topics().await;
  let q = TopicQuery::new("xyzzy", None, None).unwrap();
  assert!(s.search_topics(&q).await.unwrap().is_empty());
}

#[tokio::test]
async fn search_treats_wildcards_literally() {
  let s = seeded_topics().await;
  let q = TopicQuery::new("%", None, None).unwrap();
  assert!(s.search_topics(&q).await.unwrap().is_empty());
}

#[tokio::test]
async fn search_omits_sites_but_get_topic_returns_them() {
  let s = seeded_topics().await;

  let q = TopicQuery::new("diabetes", None, Some(1)).unwrap();
  let hits = s.search_topics(&q).await.unwrap();
  let hit = &hits[0];
  assert!(hit.sites.is_empty());
  assert_eq!(hit.aliases, vec!["Diabetes mellitus"]);

  let full = s.get_topic(1).await.unwrap().unwrap();
  assert_eq!(full.sites.len(), 1);
  assert_eq!(full.primary_institute.unwrap().name, "NIDDK");
}

#[tokio::test]
async fn get_missing_topic_returns_none() {
  let s = seeded_topics().await;
  assert!(s.get_topic(999).await.unwrap().is_none());
}

#[tokio::test]
async fn languages_are_distinct_and_sorted() {
  let s = seeded_topics().await;
  assert_eq!(s.list_languages().await.unwrap(), vec!["English", "Spanish"]);
}

#[tokio::test]
async fn reimport_replaces_topic() {
  let s = seeded_topics().await;
  s.import_topics(vec![topic(5, "Asthma in Children", "English")])
    .await
    .unwrap();
  assert_eq!(s.get_topic(5).await.unwrap().unwrap().title, "Asthma in Children");
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

impl SqliteStore {
  /// Number of survey rows stored for `user`.
  async fn row_count(&self, user: Uuid) -> i64 {
    let user_str = crate::encode::encode_uuid(user);
    self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM survey_responses WHERE user_id = ?1",
          rusqlite::params![user_str],
          |r| r.get(0),
        )?)
      })
      .await
      .unwrap()
  }
}
