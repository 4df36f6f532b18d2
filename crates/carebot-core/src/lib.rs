//! # Carebot Core
//!
//! Service-agnostic logic for carebot, a retrieval-augmented question
//! answering assistant over health-insurance documents.
//!
//! This crate has no tokio, HTTP client, or filesystem I/O. Hosted services
//! are reached through the traits defined here and implemented in the
//! `carebot` app crate.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Documents, index specs, vector records, runs |
//! | [`error`] | Error taxonomy shared by every component |
//! | [`embedding`] | [`embedding::Embedder`] trait and dimension probe |
//! | [`index`] | Vector index traits and the index lifecycle manager |
//! | [`chat`] | Chat model trait |
//! | [`trace`] | Run/feedback store trait |
//! | [`engine`] | Ingest, retrieve and answer |
//! | [`monitor`] | Run-count reporting |
//! | [`memory`] | In-memory implementations of every trait |

pub mod chat;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod memory;
pub mod models;
pub mod monitor;
pub mod trace;

pub use error::{Error, Result};
