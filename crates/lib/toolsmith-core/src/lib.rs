//! Core services for toolsmith.
//!
//! This crate turns interface documentation into callable tools: it parses
//! markdown into interface records, infers parameter schemas, drives the code
//! generation collaborator, keeps the interface store and tool registry in
//! `SurrealDB`, and dispatches tool invocations to generated modules.

pub mod clock;
pub mod control;
pub mod dispatch;
pub mod generation;
pub mod inference;
pub mod modules;
pub mod parsers;
pub mod source;
pub mod store;
