//! Session-token verification against the hosted auth service.

use plainmed_core::session::SessionUser;
use reqwest::{Method, StatusCode};

use crate::{Error, PostgrestStore, Result};

impl PostgrestStore {
  /// Resolve a user's bearer token to the account it was issued for.
  ///
  /// A token the auth service refuses yields [`Error::InvalidToken`].
  pub async fn verify_session(&self, token: &str) -> Result<SessionUser> {
    let url = self.client.auth_url("/user");
    let user: Result<SessionUser> = self
      .client
      .read("verify_session", || {
        self.client.request(Method::GET, &url, Some(token))
      })
      .await;

    match user {
      Err(Error::Status { status, .. })
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
      {
        Err(Error::InvalidToken)
      }
      other => other,
    }
  }
}

