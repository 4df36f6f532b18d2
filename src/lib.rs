//! # Carebot
//!
//! A retrieval-augmented question answering assistant for health care
//! insurance documents.
//!
//! PDF documents are embedded with a Hugging Face model and stored in a
//! Pinecone index; questions are answered by a Mistral chat model from the
//! most similar documents, and every answer is logged to LangSmith.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  ./data  │──▶│  RAG engine  │──▶│   Pinecone   │
//! │  *.pdf   │   │ (core crate) │   │    index     │
//! └──────────┘   └──────┬───────┘   └──────────────┘
//!                       │
//!          ┌────────────┼────────────┐
//!          ▼            ▼            ▼
//!    ┌──────────┐ ┌──────────┐ ┌───────────┐
//!    │   HF     │ │ Mistral  │ │ LangSmith │
//!    │embedding │ │   chat   │ │  traces   │
//!    └──────────┘ └──────────┘ └───────────┘
//! ```
//!
//! Service-agnostic logic (index lifecycle, engine, monitor) lives in
//! `carebot-core`; this crate provides the concrete clients and the shell.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Environment configuration |
//! | [`loader`] | PDF document loader |
//! | [`http`] | Shared HTTP helpers |
//! | [`embedding`] | Hugging Face embedding client |
//! | [`pinecone`] | Pinecone control and data plane client |
//! | [`mistral`] | Mistral streaming chat client |
//! | [`langsmith`] | LangSmith trace store client |
//! | [`app`] | Component initialization |
//! | [`shell`] | Interactive menu state machine |
//! | [`terminal`] | Stdin and Ctrl-C input |

pub mod app;
pub mod config;
pub mod embedding;
pub mod http;
pub mod langsmith;
pub mod loader;
pub mod mistral;
pub mod pinecone;
pub mod shell;
pub mod terminal;
