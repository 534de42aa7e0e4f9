//! # milepost (library surface)
//!
//! Exposes the API and CLI modules so integration tests can build the router
//! and drive commands without spawning a process.

pub mod api;
pub mod cli;
