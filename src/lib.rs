//! # ragdesk
//!
//! A topic-scoped retrieval-augmented help desk.
//!
//! Administrators file plain-text documents under topics. ragdesk chunks and
//! embeds them into an immutable, topic-partitioned index snapshot. Users pick
//! a topic and ask questions; each question is answered from the nearest
//! chunks of that topic, with the user's recent dialogue as context. Users
//! can hand off to a human operator at any time, and each user gets a daily
//! question quota.
//!
//! ## Architecture
//!
//! ```text
//!   admin ──▶ AdminWorkflow ──▶ DocumentStore (SQLite)
//!                  │                   │
//!                  ▼                   ▼
//!             IndexManager ◀── IndexBuilder (chunk + embed)
//!                  │  Arc<Snapshot>
//!                  ▼
//!   user ──▶ AdmissionController ──▶ ConversationEngine ──▶ Completer
//!                  │
//!                  └──▶ OperatorChannel (support mode)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | SQLite document store |
//! | [`embedding`] / [`completion`] | Model providers |
//! | [`index`] | Snapshot building and atomic publication |
//! | [`session`] | Per-user session state and quota |
//! | [`conversation`] | Retrieval-augmented answering |
//! | [`admission`] | Message classification and routing |
//! | [`operator`] | Hand-off to human operators |
//! | [`admin`] | Document management followed by rebuilds |
//! | [`ingest`] | Directory import |
//! | [`app`] | Component wiring |
//! | [`server`] | JSON HTTP adapter |

pub mod admin;
pub mod admission;
pub mod app;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod operator;
pub mod server;
pub mod session;
pub mod sqlite_store;
pub mod upstream;

pub use ragdesk_core::models;
