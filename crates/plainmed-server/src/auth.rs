//! Bearer-token session gate for user-scoped routes.
//!
//! The gate resolves `Authorization: Bearer <token>` to a [`SessionUser`] and
//! stores it in the request extensions, where the API handlers check it
//! against the user a request targets.

use std::{collections::HashMap, sync::Arc};

use axum::{
  extract::{Request, State},
  http::{HeaderMap, header},
  middleware::Next,
  response::{IntoResponse, Response},
};
use plainmed_api::ApiError;
use plainmed_core::{Error as CoreError, session::SessionUser};
use plainmed_store_postgrest::PostgrestStore;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{AuthSettings, StaticSession};

/// Hex-encoded SHA-256 of `token`, as stored in `auth.sessions[].token_sha256`.
pub fn hash_token(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }

#[derive(Debug, Error)]
pub enum GateError {
  #[error("auth mode `supabase` requires the supabase store backend")]
  SupabaseWithoutHostedStore,
  #[error("static session #{0}: token_sha256 must be 64 hex characters")]
  BadDigest(usize),
}

/// How session tokens are checked.
#[derive(Clone)]
pub enum SessionGate {
  /// No check; requests carry no session.
  Off,
  /// Fixed tokens from configuration, keyed by their SHA-256 digest.
  Static(Arc<HashMap<String, SessionUser>>),
  /// Tokens verified against the hosted auth service.
  Supabase(PostgrestStore),
}

impl SessionGate {
  /// Build the gate named by `settings`. `hosted` is the hosted store when
  /// that backend is configured.
  pub fn from_settings(
    settings: &AuthSettings,
    hosted: Option<&PostgrestStore>,
  ) -> Result<Self, GateError> {
    match settings {
      AuthSettings::Off => Ok(SessionGate::Off),
      AuthSettings::Static { sessions } => Self::from_static(sessions),
      AuthSettings::Supabase => hosted
        .cloned()
        .map(SessionGate::Supabase)
        .ok_or(GateError::SupabaseWithoutHostedStore),
    }
  }

  fn from_static(sessions: &[StaticSession]) -> Result<Self, GateError> {
    let mut by_digest = HashMap::with_capacity(sessions.len());
    for (i, s) in sessions.iter().enumerate() {
      let digest = s.token_sha256.trim().to_ascii_lowercase();
      if digest.len() != 64 || hex::decode(&digest).is_err() {
        return Err(GateError::BadDigest(i));
      }
      by_digest.insert(digest, SessionUser { user_id: s.user_id, email: s.email.clone() });
    }
    Ok(SessionGate::Static(Arc::new(by_digest)))
  }

  /// Resolve `token` to its session, or fail with `Unauthenticated`.
  pub async fn resolve(&self, token: &str) -> Result<SessionUser, CoreError> {
    match self {
      SessionGate::Off => Err(CoreError::Unauthenticated("session gate is off".into())),
      SessionGate::Static(sessions) => sessions
        .get(&hash_token(token))
        .cloned()
        .ok_or_else(|| CoreError::Unauthenticated("unknown session token".into())),
      SessionGate::Supabase(store) => Ok(store.verify_session(token).await?),
    }
  }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
}

/// Middleware: require a valid session unless the gate is off.
pub async fn require_session(
  State(gate): State<SessionGate>,
  mut req: Request,
  next: Next,
) -> Response {
  if matches!(gate, SessionGate::Off) {
    return next.run(req).await;
  }

  let Some(token) = bearer_token(req.headers()).map(str::to_owned) else {
    return ApiError::from(CoreError::Unauthenticated("missing bearer token".into()))
      .into_response();
  };

  match gate.resolve(&token).await {
    Ok(user) => {
      tracing::debug!(user_id = %user.user_id, "session resolved");
      req.extensions_mut().insert(user);
      next.run(req).await
    }
    Err(e) => ApiError::from(e).into_response(),
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  fn static_gate(token: &str, user_id: Uuid) -> SessionGate {
    SessionGate::from_settings(
      &AuthSettings::Static {
        sessions: vec![StaticSession {
          token_sha256: hash_token(token).to_ascii_uppercase(),
          user_id,
          email: None,
        }],
      },
      None,
    )
    .unwrap()
  }

  #[test]
  fn hash_token_is_sha256_hex() {
    assert_eq!(
      hash_token("abc"),
      "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
  }

  #[tokio::test]
  async fn static_tokens_resolve_by_digest() {
    let user = Uuid::new_v4();
    let gate = static_gate("s3cret", user);

    assert_eq!(gate.resolve("s3cret").await.unwrap().user_id, user);
    assert!(matches!(gate.resolve("guess").await, Err(CoreError::Unauthenticated(_))));
  }

  #[test]
  fn malformed_digest_is_rejected() {
    let settings = AuthSettings::Static {
      sessions: vec![StaticSession {
        token_sha256: "not-hex".into(),
        user_id:      Uuid::new_v4(),
        email:        None,
      }],
    };
    assert!(matches!(
      SessionGate::from_settings(&settings, None),
      Err(GateError::BadDigest(0))
    ));
  }

  #[test]
  fn supabase_mode_needs_hosted_store() {
    assert!(matches!(
      SessionGate::from_settings(&AuthSettings::Supabase, None),
      Err(GateError::SupabaseWithoutHostedStore)
    ));
  }

  #[test]
  fn bearer_token_parsing() {
    let mut h = HeaderMap::new();
    assert_eq!(bearer_token(&h), None);
    h.insert(header::AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
    assert_eq!(bearer_token(&h), None);
    h.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
    assert_eq!(bearer_token(&h), Some("abc"));
  }
}
