//! Pass runner over stdio.
//!
//! Each input line is a JSON envelope `{"session"?, "page", "action"}`; each
//! pass writes any streamed fragments followed by exactly one render or
//! error line.

mod runner;

pub use runner::*;
