//! # docgate Core
//!
//! Runtime-agnostic pieces of docgate: document and index models, the
//! collaborator traits the dispatcher calls through (document, webhook,
//! object and parameter storage, pub/sub publish, full-text index), and
//! in-memory implementations of each.
//!
//! This crate contains no tokio, HTTP client, or other native-only
//! dependencies.

pub mod models;
pub mod search;
pub mod store;
