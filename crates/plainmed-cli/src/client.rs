//! Async HTTP client wrapping the plainmed JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use plainmed_core::{
  survey::{Condition, MedicalHistory, PersonalInfo},
  topic::MedicalTopic,
};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use uuid::Uuid;

/// Connection settings for the plainmed API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  /// Session token sent as `Authorization: Bearer`, when the server gates
  /// user routes.
  pub token:    Option<String>,
}

/// `{source, results}` from `/api/search`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResults {
  pub source:  String,
  pub results: Vec<MedicalTopic>,
}

/// `{hasCompletedForm, data}` from `/api/personal-info/{id}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfoView {
  pub has_completed_form: bool,
  pub data:               Option<PersonalInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Initialized {
  pub success: bool,
  pub created: usize,
}

#[derive(Deserialize)]
struct Languages {
  languages: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
  error: String,
}

/// Async HTTP client for the plainmed JSON REST API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
  }

  /// `/api` followed by `segments`, each percent-encoded as one path segment.
  fn segment_url(&self, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(&self.url(""))
      .with_context(|| format!("invalid server URL {:?}", self.config.base_url))?;
    url
      .path_segments_mut()
      .map_err(|()| anyhow!("server URL {:?} cannot take a path", self.config.base_url))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    match &self.config.token {
      Some(token) if !token.is_empty() => req.bearer_auth(token),
      _ => req,
    }
  }

  /// Send `req`, turning a non-success status into an error carrying the
  /// server's `error` message.
  async fn send<T: DeserializeOwned>(&self, what: &str, req: RequestBuilder) -> Result<T> {
    tracing::debug!(request = what, "sending");
    let resp = self
      .auth(req)
      .send()
      .await
      .with_context(|| format!("{what} failed"))?;
    decode(what, resp).await
  }

  // ── Reference topics ──────────────────────────────────────────────────────

  /// `GET /api/search?query=<q>[&language=<l>][&n_results=<n>]`
  pub async fn search(
    &self,
    query: &str,
    language: Option<&str>,
    n_results: Option<u32>,
  ) -> Result<SearchResults> {
    let mut params = vec![("query", query.to_string())];
    if let Some(l) = language {
      params.push(("language", l.to_string()));
    }
    if let Some(n) = n_results {
      params.push(("n_results", n.to_string()));
    }
    self
      .send("GET /search", self.client.get(self.url("/search")).query(&params))
      .await
  }

  /// `GET /api/topics/{id}`
  pub async fn topic(&self, topic_id: i64) -> Result<MedicalTopic> {
    self
      .send("GET /topics", self.client.get(self.url(&format!("/topics/{topic_id}"))))
      .await
  }

  /// `GET /api/languages`
  pub async fn languages(&self) -> Result<Vec<String>> {
    let body: Languages = self
      .send("GET /languages", self.client.get(self.url("/languages")))
      .await?;
    Ok(body.languages)
  }

  // ── User records ──────────────────────────────────────────────────────────

  /// `POST /api/initialize-user`
  pub async fn initialize(&self, user_id: Uuid, email: Option<&str>) -> Result<Initialized> {
    let body = json!({ "user_id": user_id, "email": email });
    self
      .send(
        "POST /initialize-user",
        self.client.post(self.url("/initialize-user")).json(&body),
      )
      .await
  }

  /// `GET /api/personal-info/{id}`
  pub async fn personal_info(&self, user_id: Uuid) -> Result<PersonalInfoView> {
    self
      .send(
        "GET /personal-info",
        self.client.get(self.url(&format!("/personal-info/{user_id}"))),
      )
      .await
  }

  /// `POST /api/personal-info`
  pub async fn save_personal_info(
    &self,
    user_id: Uuid,
    info: &PersonalInfo,
  ) -> Result<PersonalInfo> {
    let mut body = serde_json::to_value(info).context("serialising personal info")?;
    body["user_id"] = json!(user_id);
    self
      .send(
        "POST /personal-info",
        self.client.post(self.url("/personal-info")).json(&body),
      )
      .await
  }

  /// `GET /api/medical-history/{id}/conditions`
  pub async fn conditions(&self, user_id: Uuid) -> Result<Vec<Condition>> {
    self
      .send(
        "GET /conditions",
        self.client.get(self.url(&conditions_path(user_id))),
      )
      .await
  }

  /// `POST /api/medical-history/{id}/conditions`
  pub async fn add_conditions(
    &self,
    user_id: Uuid,
    conditions: &[Condition],
  ) -> Result<MedicalHistory> {
    self
      .send(
        "POST /conditions",
        self.client.post(self.url(&conditions_path(user_id))).json(conditions),
      )
      .await
  }

  /// `DELETE /api/medical-history/{id}/conditions/{concept_id}`
  pub async fn remove_condition(&self, user_id: Uuid, concept_id: &str) -> Result<MedicalHistory> {
    let user = user_id.to_string();
    let url = self.segment_url(&["medical-history", &user, "conditions", concept_id])?;
    self
      .send("DELETE /conditions", self.client.delete(url))
      .await
  }
}

fn conditions_path(user_id: Uuid) -> String { format!("/medical-history/{user_id}/conditions") }

async fn decode<T: DeserializeOwned>(what: &str, resp: Response) -> Result<T> {
  let status = resp.status();
  if !status.is_success() {
    let message = resp
      .json::<ErrorBody>()
      .await
      .map(|b| b.error)
      .unwrap_or_else(|_| status.to_string());
    return Err(anyhow!("{what} → {status}: {message}"));
  }
  resp
    .json()
    .await
    .with_context(|| format!("deserialising {what} response"))
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use plainmed_store_sqlite::SqliteStore;
  use tokio::net::TcpListener;

  use super::*;

  /// Serve the real API over an in-memory store and return a client for it.
  async fn serve() -> ApiClient {
    let store = SqliteStore::open_in_memory().await.unwrap();
    store
      .import_topics(vec![
        MedicalTopic::new(1, "Asthma", "English"),
        MedicalTopic::new(2, "Asma", "Spanish"),
        MedicalTopic::new(3, "Asthma in Children", "English"),
      ])
      .await
      .unwrap();

    let app = axum::Router::new().nest("/api", plainmed_api::api_router(Arc::new(store)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    ApiClient::new(ApiConfig { base_url: format!("http://{addr}/"), token: None }).unwrap()
  }

  #[tokio::test]
  async fn search_passes_language_and_limit() {
    let api = serve().await;

    let hits = api.search("asthma", None, Some(1)).await.unwrap();
    assert_eq!(hits.source, "sqlite");
    assert_eq!(hits.results.len(), 1);
    assert_eq!(hits.results[0].topic_id, 1);

    let hits = api.search("asma", Some("Spanish"), None).await.unwrap();
    assert_eq!(hits.results.len(), 1);
    assert_eq!(hits.results[0].title, "Asma");
  }

  #[tokio::test]
  async fn server_error_message_is_surfaced() {
    let api = serve().await;

    let err = api.search("  ", None, None).await.unwrap_err().to_string();
    assert!(err.contains("400"), "{err}");

    let err = api.topic(99).await.unwrap_err().to_string();
    assert!(err.contains("topic 99 not found"), "{err}");
  }

  #[tokio::test]
  async fn topic_and_languages() {
    let api = serve().await;
    assert_eq!(api.topic(3).await.unwrap().title, "Asthma in Children");

    let mut langs = api.languages().await.unwrap();
    langs.sort();
    assert_eq!(langs, ["English", "Spanish"]);
  }

  #[tokio::test]
  async fn personal_info_round_trip() {
    let api = serve().await;
    let user = Uuid::new_v4();

    let before = api.personal_info(user).await.unwrap();
    assert!(!before.has_completed_form);
    assert!(before.data.is_none());

    let info = PersonalInfo {
      age_range: "25-34".into(),
      gender:    "female".into(),
      language:  "Spanish".into(),
    };
    assert_eq!(api.save_personal_info(user, &info).await.unwrap(), info);

    let after = api.personal_info(user).await.unwrap();
    assert!(after.has_completed_form);
    assert_eq!(after.data, Some(info));
  }

  #[tokio::test]
  async fn conditions_add_list_remove() {
    let api = serve().await;
    let user = Uuid::new_v4();

    let first = [Condition::new("C1", "Asthma"), Condition::new("C2", "Diabetes")];
    let history = api.add_conditions(user, &first).await.unwrap();
    assert_eq!(history.conditions.len(), 2);

    api.add_conditions(user, &[Condition::new("C1", "Asthma")]).await.unwrap();
    assert_eq!(api.conditions(user).await.unwrap().len(), 2);

    let history = api.remove_condition(user, "C1").await.unwrap();
    assert_eq!(history.conditions, vec![Condition::new("C2", "Diabetes")]);
  }

  #[tokio::test]
  async fn concept_ids_with_url_delimiters_are_removed() {
    let api = serve().await;
    let user = Uuid::new_v4();

    let odd = "MP/12?v=2#a b";
    api
      .add_conditions(user, &[Condition::new(odd, "Odd"), Condition::new("C2", "Diabetes")])
      .await
      .unwrap();

    let history = api.remove_condition(user, odd).await.unwrap();
    assert_eq!(history.conditions, vec![Condition::new("C2", "Diabetes")]);
  }

  #[tokio::test]
  async fn initialize_reports_created_rows() {
    let api = serve().await;
    let user = Uuid::new_v4();

    let first = api.initialize(user, Some("a@example.com")).await.unwrap();
    assert!(first.success);
    assert_eq!(first.created, 2);
    assert_eq!(api.initialize(user, None).await.unwrap().created, 0);
  }
}
