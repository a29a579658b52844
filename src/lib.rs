//! # docchat
//!
//! Chat with heterogeneous documents.
//!
//! Uploaded PDF, Word (`.docx`), Excel (`.xlsx`) and plain-text files are
//! extracted into one combined corpus with per-document provenance. Questions
//! about the corpus go to a chat-completions endpoint, and each exchange is
//! recorded in a conversation that can be archived, listed and reloaded.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Uploads     │──▶│  Extractors │──▶│ CorpusStore  │
//! │ pdf/docx/... │   │ + xlsx      │   │ + provenance │
//! └──────────────┘   └─────────────┘   └──────┬───────┘
//!                                             │ corpus + query
//!                    ┌──────────────┐   ┌─────▼────────┐
//!                    │SessionManager│◀──│  Completion  │
//!                    │  (archive)   │   │   Gateway    │
//!                    └──────────────┘   └──────────────┘
//! ```
//!
//! [`app::ApplicationSession`] owns all of the above for one user.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Core data types |
//! | [`extract`] | Text, PDF and Word extraction |
//! | [`spreadsheet`] | Excel extraction with fallbacks |
//! | [`corpus`] | Ingested documents and the combined corpus |
//! | [`session`] | Active conversation and archive |
//! | [`gateway`] | Chat-completions client |
//! | [`app`] | Per-user application state |
//! | [`config`] | TOML configuration parsing |
//! | [`progress`] | Ingestion progress reporting |
//! | [`commands`], [`repl`] | CLI commands and the chat loop |

pub mod app;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod extract;
pub mod gateway;
pub mod models;
pub mod progress;
pub mod repl;
pub mod session;
pub mod spreadsheet;
