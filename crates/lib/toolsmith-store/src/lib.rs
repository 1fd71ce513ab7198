//! Data model and schema helpers for toolsmith.
//!
//! This crate defines the records shared by the parser, the stores, the
//! synthesis orchestrator and the dispatcher, plus the one key function that
//! ties an interface to its tool and module file.

pub mod models;
pub mod schema;

pub use models::*;
