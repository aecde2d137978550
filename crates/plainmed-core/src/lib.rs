//! Core types and trait definitions for the plainmed health-record service.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::HealthStore`]; the API layer and the
//! server depend on that abstraction, not on any concrete backend.

// Native `async fn` in traits; silence the advisory lint about `Send` bounds.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod records;
pub mod session;
pub mod store;
pub mod survey;
pub mod topic;

pub use error::{Error, Result};
