//! # Subnet Copilot
//!
//! A retrieval-grounded assistant for subnet configuration. It answers
//! developer questions from a fixed Markdown documentation corpus and returns
//! a strict two-field result: a free-text `reply` and an `update` JSON
//! merge-patch for the caller's configuration.
//!
//! ## Architecture
//!
//! ```text
//!  startup                                     per request
//! ┌────────┐  ┌───────────┐  ┌───────┐        ┌───────────┐   ┌──────────┐
//! │ corpus │─▶│ normalize │─▶│ chunk │─┐      │ retrieve  │──▶│  prompt  │
//! └────────┘  └───────────┘  └───────┘ │      │   (k=5)   │   │ assemble │
//!                                      ▼      └─────▲─────┘   └────┬─────┘
//!                             ┌──────────────┐      │              ▼
//!                             │ SemanticIndex│──────┘      ┌──────────────┐
//!                             │ embed+persist│             │ orchestrator │
//!                             └──────────────┘             │ generate ⇄   │
//!                                                          │ validate     │
//!                                                          └──────┬───────┘
//!                                                                 ▼
//!                                                         {reply, update}
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! copilot index                          # build or reuse ./chroma_db
//! copilot search "fee manager admins"    # inspect retrieval
//! copilot ask "What is the default gas limit?"
//! copilot serve                          # POST /chat on 0.0.0.0:8000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`corpus`] | Markdown corpus loading |
//! | [`normalize`] | Image and front-matter stripping |
//! | [`chunk`] | Fixed-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Index persistence (SQLite, in-memory) |
//! | [`index`] | Semantic index build, load, and query |
//! | [`retrieve`] | Top-k context retrieval |
//! | [`prompt`] | Prompt assembly and output format instructions |
//! | [`generation`] | Language model backends |
//! | [`validate`] | Structured output validation |
//! | [`orchestrator`] | Bounded generate/validate retry loop |
//! | [`assistant`] | Startup lifecycle and `answer` |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod ask;
pub mod assistant;
pub mod chunk;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod index_cmd;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod prompt;
pub mod retrieve;
pub mod server;
pub mod store;
mod transport;
pub mod validate;
