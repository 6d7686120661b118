//! # docgate
//!
//! A single-entrypoint dispatcher for a document API.
//!
//! One invocation unit receives every event: interactive API requests are
//! routed to a handler by resource and verb, gated by an access policy and
//! answered with one JSON envelope; batches of queued change records are
//! drained into the search index.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌────────────┐
//!   raw event ──▶ │ Dispatcher │──── batch ────▶ IndexSynchronizer ──▶ SearchIndex
//!                 └─────┬──────┘
//!                       │ interactive
//!                       ▼
//!   HandlerRegistry ─▶ policy ─▶ RequestHandler ─▶ notify ─▶ normalize ─▶ WireEnvelope
//!                                     │
//!                                     ▼
//!                        Services (stores, index, publisher)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`event`] | Inbound event classification |
//! | [`capability`] | Caller capabilities from authorizer claims |
//! | [`traits`] | `RequestHandler` trait and `HandlerRegistry` |
//! | [`policy`] | Access policy |
//! | [`response`] | Outcomes, error taxonomy, wire envelope |
//! | [`notify`] | `webnotify` notification fanout |
//! | [`sync`] | Change records → search index |
//! | [`dispatch`] | The entrypoint |
//! | [`handlers`] | Built-in handler catalog |
//! | [`services`] | Collaborator wiring |
//! | [`typesense`] | Typesense search index |
//! | [`publish`] | HTTP publisher |
//! | [`server`] | Local HTTP front |

pub mod capability;
pub mod config;
pub mod dispatch;
pub mod event;
pub mod handlers;
pub mod notify;
pub mod policy;
pub mod publish;
pub mod response;
pub mod server;
pub mod services;
pub mod sync;
pub mod traits;
pub mod typesense;
