//! # kitspace-api
//!
//! HTTP API layer for the Kitspace processor built on Axum.
//!
//! Serves status polling and processed assets, accepts processing triggers
//! (bearer token) and Gitea push webhooks (HMAC signature), and reports
//! health. `AppError` maps to JSON error responses here.

pub mod app;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, build_pipeline, run_server};
pub use state::AppState;
