//! AIr4 is a local-first chat client for a remote inference and retrieval
//! backend.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns durable sessions, backend reachability, the streaming
//!   exchange pipeline, retrieval merging, and persisted preferences.
//! - [`api`] defines the request payloads and the tolerant decoders for the
//!   backend's responses.
//! - [`cli`] parses command-line arguments and drives the engine from a
//!   terminal.
//! - [`utils`] holds small helpers (ids, URL handling, the transcript log).
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`], which
//! builds a [`core::app::AppContext`] and dispatches the chosen command.

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
