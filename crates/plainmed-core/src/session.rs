//! Authenticated session identity.
//!
//! Sessions are issued by an external auth provider. This crate only models
//! what a validated token resolves to and the ownership check applied to
//! user-scoped operations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// The user a validated session token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
  #[serde(rename = "id")]
  pub user_id: Uuid,
  #[serde(default)]
  pub email:   Option<String>,
}

impl SessionUser {
  pub fn new(user_id: Uuid) -> Self { Self { user_id, email: None } }
}

/// Check that `session` may act on `user_id`'s records.
///
/// `None` means the server runs without a session gate; every request passes.
pub fn authorize(session: Option<&SessionUser>, user_id: Uuid) -> Result<()> {
  match session {
    Some(s) if s.user_id != user_id => Err(Error::Unauthenticated(format!(
      "session does not belong to user {user_id}"
    ))),
    _ => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn no_session_gate_allows_everything() {
    assert!(authorize(None, Uuid::new_v4()).is_ok());
  }

  #[test]
  fn session_must_match_target_user() {
    let me = SessionUser::new(Uuid::new_v4());
    assert!(authorize(Some(&me), me.user_id).is_ok());
    assert!(matches!(
      authorize(Some(&me), Uuid::new_v4()),
      Err(Error::Unauthenticated(_))
    ));
  }

  #[test]
  fn deserialises_auth_provider_user() {
    let user: SessionUser = serde_json::from_str(
      r#"{"id":"6f1c3f5e-2f7b-4c55-9d0e-6c3f1f0e9a11","email":"a@example.com","role":"authenticated"}"#,
    )
    .unwrap();
    assert_eq!(user.email.as_deref(), Some("a@example.com"));
  }
}
