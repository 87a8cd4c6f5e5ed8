//! # ragdesk core
//!
//! Runtime-agnostic building blocks for ragdesk: data models, the text
//! chunker, immutable index snapshots, and the trait seams for document
//! storage, embedding, and answer completion.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Everything
//! here is either a pure function or an `async-trait` interface that the
//! `ragdesk` application crate implements.

pub mod chunk;
pub mod completion;
pub mod embedding;
pub mod models;
pub mod snapshot;
pub mod store;
