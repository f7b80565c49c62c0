//! Process exit codes
//!
//! The summary line on stdout carries the detail; the exit code only says
//! whether the call succeeded.

/// The command completed and printed a success summary
pub const EXIT_SUCCESS: i32 = 0;

/// The command failed; a failure summary was printed
pub const EXIT_ERROR: i32 = 1;
