//! Command-line front end for the Claude bridge
//!
//! Stdout is reserved for the line protocol and JSON summaries. Everything
//! diagnostic goes to stderr through `tracing`.

pub mod cli;
pub mod commands;
pub mod error;
pub mod exit_codes;
pub mod logging;
