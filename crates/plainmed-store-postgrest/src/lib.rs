//! Hosted backend for the plainmed health store.
//!
//! Talks to a Supabase project over its PostgREST interface (`/rest/v1`) and
//! its auth service (`/auth/v1`). Every call carries the client-wide timeout;
//! idempotent reads are retried with exponential backoff, writes never are.
//!
//! The hosted `survey_responses` table must carry a unique constraint on
//! `(user_id, survey_type)` and an integer `version` column defaulting to 1.

mod client;
mod session;
mod store;

pub mod error;

pub use client::PostgrestConfig;
pub use error::{Error, Result};
pub use store::PostgrestStore;
