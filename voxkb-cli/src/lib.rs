//! # voxkb-cli
//!
//! Command-line front end for a voxkb knowledge base stored in SQLite.
//!
//! ```bash
//! voxkb ingest handbook.txt
//! voxkb add "Dogs are mammals." "FastAPI is a web framework."
//! voxkb ask "Tell me about Python" --conversation me
//! voxkb chat --system-prompt "You are Marina, a cheerful museum guide."
//! voxkb search dogs -k 3
//! voxkb stats
//! voxkb reset --yes
//! ```
//!
//! Embeddings and answers come from OpenAI-compatible endpoints
//! (`OPENAI_API_KEY`, `OPENAI_BASE_URL`, `VOXKB_EMBEDDING_URL`); the knowledge
//! base settings come from the `VOXKB_*` variables read by
//! [`RagConfig::from_env`](voxkb_rag::RagConfig::from_env).

pub mod cli;
pub mod commands;
pub mod repl;

pub use cli::{Cli, Commands};
