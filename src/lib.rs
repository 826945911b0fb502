//! # Elenchus-RS: Adversarial Code Review Orchestration
//!
//! A stateful MCP service orchestrating *adversarial code review*: a
//! controlled dialogue between a Verifier that raises issues and a Critic
//! that adjudicates them, iterated until the debate converges or a budget
//! runs out. The service performs no LLM inference itself; a host client
//! drives the roles through a JSON-RPC 2.0 surface over stdio.
//!
//! ## Subsystems
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   MCP Dispatch (stdio)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Session &     │  Convergence  │  Mediator   │  Safeguards  │
//! │  Round Engine  │  Evaluator    │  + Graph    │  + Optimize  │
//! │                │               │             │              │
//! │ • Admission    │ • Categories  │ • Ripple    │ • Diff scope │
//! │ • Checkpoints  │ • Stability   │ • Impact    │ • Cache      │
//! │ • Persistence  │ • Edge cases  │ • Importance│ • Tiers      │
//! │ • Alternation  │ • Coverage    │ • Cycles    │ • Sampling   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use elenchus_rs::core::config::ElenchusConfig;
//! use elenchus_rs::core::engine::SessionEngine;
//! use elenchus_rs::mcp::server::McpServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Arc::new(SessionEngine::new(ElenchusConfig::default())?);
//!     McpServer::new(engine, elenchus_rs::VERSION).run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

// Core engine modules
pub mod core {
    //! Session model, issue lifecycle, convergence, and the round engine.

    pub mod config;
    pub mod convergence;
    pub mod engine;
    pub mod errors;
    pub mod issue_index;
    pub mod issues;
    pub mod session;
}

// Language-specific AST adapters
pub mod lang {
    //! Language-specific parsing and structural extraction.

    pub mod common;
    // Tree-sitter adapters
    pub mod go;
    pub mod javascript;
    pub mod python;
    pub mod registry;
    pub mod resolve;
    pub mod rust_lang;
    pub mod typescript;

    pub use common::{LanguageAdapter, SourceFileAnalysis};
    pub use registry::{adapter_for_file, adapter_for_language, language_key_for_path};
}

// Dependency graph and mediator
pub mod graph;

// Optimization and safeguards layer
pub mod optimize;

// I/O and persistence
pub mod io;

// Role configuration and prompts
pub mod roles;

// MCP request dispatch
pub mod mcp;

// Re-export primary types for convenience
pub use crate::core::config::ElenchusConfig;
pub use crate::core::engine::SessionEngine;
pub use crate::core::errors::{ElenchusError, Result};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
