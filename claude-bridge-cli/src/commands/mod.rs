//! Command modules for the bridge CLI
//!
//! Each command lives in its own module with its help text in a
//! `description.md` next to it and a `handle_command` entry point that
//! returns the process exit code.

pub mod get_session;
pub mod get_slash_commands;
pub mod permissions;
pub mod send;
