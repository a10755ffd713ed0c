//! Parsing Strategy Module
//!
//! - Parallel: many independent documents on a rayon pool, each with its own
//!   configuration, sharing a symbol table and grammar pool

pub mod parallel;

pub use parallel::{parse_all, parse_all_named, try_parse_all, SharedResources};
