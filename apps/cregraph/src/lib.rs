//! # cregraph
//!
//! Server and CLI around `cregraph-core`. The binary in `main.rs` only sets
//! up tracing and dispatches to [`cli::execute`]; the modules live here so
//! integration tests can build the HTTP router directly.

pub mod api;
pub mod cli;
pub mod config;
