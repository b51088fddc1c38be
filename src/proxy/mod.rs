//! Vertex AI proxy
//!
//! A thin HTTP layer that lets a browser call the Vertex AI
//! `generateContent` endpoint without ever seeing a GCP credential. Requests
//! are translated, a bearer token from the ambient platform credentials is
//! attached (fetched fresh per request, never cached), and the upstream JSON
//! is passed back verbatim.

pub mod auth;
pub mod config;
pub mod routes;

pub use auth::{GcloudTokenProvider, TokenProvider};
pub use config::ProxyConfig;
pub use routes::{create_router, AppState};
