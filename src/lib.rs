//! # Policy Assistant
//!
//! Retrieval-augmented question answering over a directory of company
//! policy documents.
//!
//! The pipeline loads and chunks the corpus, embeds every chunk into a
//! SQLite-backed vector index (rebuilt only when the corpus fingerprint
//! changes), retrieves the passages nearest to a question, and asks a
//! language model for an answer grounded in those passages, with
//! deduplicated citations.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Policy dir │──▶│ Chunk + Embed │──▶│ SQLite index │
//! │  *.md *.txt │   │  (on change)  │   │ <name>_v<N>  │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//!                   ┌──────────────┐   ┌──────▼───────┐
//!   question ──────▶│    Answer    │◀──│   Retrieve   │
//!                   │  (LLM call)  │   │  (cosine k)  │
//!                   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`corpus`] | Policy file discovery and loading |
//! | [`chunk`] | Text chunking |
//! | [`fingerprint`] | Corpus fingerprint and its on-disk artifact |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store trait and SQLite implementation |
//! | [`index`] | Index reuse / rebuild lifecycle |
//! | [`retrieve`] | Similarity search |
//! | [`llm`] | Language model abstraction |
//! | [`answer`] | Grounded answers with citations |
//! | [`health`] | Health report |
//! | [`progress`] | Build progress reporting |
//! | [`commands`] | CLI command implementations |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Error type |

pub mod answer;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod health;
mod http;
pub mod index;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod retrieve;
pub mod store;
