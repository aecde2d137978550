//! HTTP server assembly for plainmed.
//!
//! Mounts the JSON API from [`plainmed_api`] under `/api`, gates the
//! user-scoped routes behind a [`SessionGate`], and adds `/health`, a JSON
//! 404 fallback, and per-request tracing.

pub mod auth;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Json, Router,
  http::{HeaderValue, StatusCode, header},
  middleware::{from_fn_with_state, map_response},
  response::{IntoResponse, Response},
  routing::get,
};
use chrono::Utc;
use plainmed_core::store::HealthStore;
use plainmed_store_postgrest::PostgrestConfig;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub use auth::SessionGate;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `plainmed.toml` and
/// `PLAINMED_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:  String,
  #[serde(default = "default_port")]
  pub port:  u16,
  #[serde(default)]
  pub store: StoreSettings,
  #[serde(default)]
  pub auth:  AuthSettings,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 3000 }

fn default_timeout_secs() -> u64 { 10 }

fn default_read_retries() -> u32 { 2 }

/// Which backend holds the data.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreSettings {
  Sqlite {
    path: PathBuf,
  },
  Supabase {
    url:          String,
    api_key:      String,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default = "default_read_retries")]
    read_retries: u32,
  },
}

impl Default for StoreSettings {
  fn default() -> Self { StoreSettings::Sqlite { path: PathBuf::from("plainmed.db") } }
}

impl StoreSettings {
  /// Connection settings for the hosted backend, if that is the one chosen.
  pub fn postgrest(&self) -> Option<PostgrestConfig> {
    match self {
      StoreSettings::Sqlite { .. } => None,
      StoreSettings::Supabase { url, api_key, timeout_secs, read_retries } => {
        let mut config = PostgrestConfig::new(url, api_key);
        config.timeout = Duration::from_secs(*timeout_secs);
        config.read_retries = *read_retries;
        Some(config)
      }
    }
  }
}

/// How bearer tokens on user-scoped routes are checked.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AuthSettings {
  #[default]
  Off,
  Static {
    #[serde(default)]
    sessions: Vec<StaticSession>,
  },
  Supabase,
}

/// A fixed token accepted by the `static` auth mode.
#[derive(Debug, Deserialize, Clone)]
pub struct StaticSession {
  /// `plainmed-server --hash-token` output for the token.
  pub token_sha256: String,
  pub user_id:      Uuid,
  #[serde(default)]
  pub email:        Option<String>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the complete application router for `store`.
pub fn router<S>(store: Arc<S>, gate: SessionGate) -> Router
where
  S: HealthStore + 'static,
{
  let user_routes = plainmed_api::user_router(store.clone())
    .route_layer(from_fn_with_state(gate, auth::require_session));

  // Outermost, so gate rejections are marked uncacheable too.
  let api = user_routes
    .merge(plainmed_api::reference_router(store))
    .fallback(api_not_found)
    .layer(map_response(plainmed_api::no_store));

  Router::new()
    .route("/health", get(health))
    .nest("/api", api)
    .fallback(api_not_found)
    .layer(TraceLayer::new_for_http())
}

/// `GET /health`
async fn health() -> Json<serde_json::Value> {
  Json(json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() }))
}

async fn api_not_found() -> Response {
  let mut res = (
    StatusCode::NOT_FOUND,
    Json(json!({ "error": "API endpoint not found" })),
  )
    .into_response();
  res
    .headers_mut()
    .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
  res
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::Request,
  };
  use plainmed_store_sqlite::SqliteStore;
  use serde_json::Value;
  use tower::ServiceExt as _;

  use super::*;
  use crate::auth::hash_token;

  const TOKEN: &str = "patient-token";

  async fn app(gate: SessionGate) -> Router {
    let store = SqliteStore::open_in_memory().await.unwrap();
    router(Arc::new(store), gate)
  }

  fn static_gate(owner: Uuid) -> SessionGate {
    SessionGate::from_settings(
      &AuthSettings::Static {
        sessions: vec![StaticSession {
          token_sha256: hash_token(TOKEN),
          user_id:      owner,
          email:        None,
        }],
      },
      None,
    )
    .unwrap()
  }

  async fn send(app: Router, uri: &str, token: Option<&str>) -> (StatusCode, Response) {
    let mut builder = Request::builder().uri(uri);
    if let Some(t) = token {
      builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    let resp = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
    (resp.status(), resp)
  }

  async fn json_body(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  // ── Health and fallback ─────────────────────────────────────────────────────

  #[tokio::test]
  async fn health_reports_ok_with_timestamp() {
    let (status, resp) = send(app(SessionGate::Off).await, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "ok");
    let ts = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok(), "timestamp: {ts}");
  }

  #[tokio::test]
  async fn unknown_api_route_is_json_404() {
    for uri in ["/api/nope", "/api/topics/1/extra", "/elsewhere"] {
      let (status, resp) = send(app(SessionGate::Off).await, uri, None).await;
      assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
      assert_eq!(json_body(resp).await["error"], "API endpoint not found");
    }
  }

  // ── Session gate ────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn gate_off_serves_user_routes_without_token() {
    let uri = format!("/api/personal-info/{}", Uuid::new_v4());
    let (status, _) = send(app(SessionGate::Off).await, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
  }

  #[tokio::test]
  async fn missing_or_unknown_token_is_401() {
    let owner = Uuid::new_v4();
    let uri = format!("/api/personal-info/{owner}");

    let (status, resp) = send(app(static_gate(owner)).await, &uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()[header::WWW_AUTHENTICATE], "Bearer");
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");

    let (status, resp) = send(app(static_gate(owner)).await, &uri, Some("forged")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
  }

  #[tokio::test]
  async fn token_only_opens_its_own_records() {
    let owner = Uuid::new_v4();

    let mine = format!("/api/personal-info/{owner}");
    let (status, _) = send(app(static_gate(owner)).await, &mine, Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);

    let theirs = format!("/api/medical-history/{}/conditions", Uuid::new_v4());
    let (status, _) = send(app(static_gate(owner)).await, &theirs, Some(TOKEN)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn reference_routes_are_never_gated() {
    let gate = static_gate(Uuid::new_v4());
    let (status, resp) = send(app(gate).await, "/api/languages", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
  }

  // ── Configuration ───────────────────────────────────────────────────────────

  fn parse(toml: &str) -> ServerConfig {
    config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_config_uses_defaults() {
    let cfg = parse("");
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.port, 3000);
    assert!(matches!(cfg.store, StoreSettings::Sqlite { .. }));
    assert!(matches!(cfg.auth, AuthSettings::Off));
  }

  #[test]
  fn supabase_config_fills_client_defaults() {
    let cfg = parse(
      r#"
        port = 8080

        [store]
        backend = "supabase"
        url     = "https://abc.supabase.co"
        api_key = "anon"

        [auth]
        mode = "supabase"
      "#,
    );
    assert_eq!(cfg.port, 8080);
    let pg = cfg.store.postgrest().unwrap();
    assert_eq!(pg.url, "https://abc.supabase.co");
    assert_eq!(pg.timeout, Duration::from_secs(10));
    assert_eq!(pg.read_retries, 2);
    assert!(matches!(cfg.auth, AuthSettings::Supabase));
  }

  #[test]
  fn static_sessions_parse() {
    let cfg = parse(
      r#"
        [auth]
        mode = "static"

        [[auth.sessions]]
        token_sha256 = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        user_id      = "6f1c3f5e-2f7b-4c55-9d0e-6c3f1f0e9a11"
      "#,
    );
    let AuthSettings::Static { sessions } = cfg.auth else { panic!("expected static auth") };
    assert_eq!(sessions.len(), 1);
    assert!(SessionGate::from_settings(&AuthSettings::Static { sessions }, None).is_ok());
  }
}
