//! Parsers for documentation inputs.
//!
//! The markdown scanner splits a document into blocks; the interface parser
//! walks those blocks and recovers one record per documented interface.

pub mod interfaces;
pub mod markdown;

pub use interfaces::{
    InterfaceParseError,
    InterfaceParseOptions,
    InterfaceParser,
    ParseOutput,
    ParseSkip,
    SkipReason,
};
