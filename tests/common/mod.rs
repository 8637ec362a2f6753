#![allow(dead_code)]
//! Shared test utilities for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: class, archive, definition and mapping builders
//! - `harness`: a small interpreter for executing generated bytecode

pub mod fixtures;
pub mod harness;

use classweave_core::definition::DefinitionSet;
use classweave_core::processor::{BuildContext, ProcessOptions};
use classweave_mappings::Mapping;

pub use fixtures::*;
pub use harness::{Machine, Value};

/// Build context with default options and no renaming.
pub fn context(definitions: &str) -> BuildContext {
    context_with(definitions, Vec::new(), ProcessOptions::default())
}

pub fn context_with(definitions: &str, mappings: Vec<Mapping>, options: ProcessOptions) -> BuildContext {
    let set = DefinitionSet::from_json(definitions).expect("definitions should parse");
    BuildContext::new(set, mappings, options)
}
