//! Symbol namespaces and mapping tables.
//!
//! A [`Mapping`] renames classes and members from a source namespace (for
//! example `intermediary`) to a target namespace (for example `named`).
//! Mappings come from Tiny files and can be composed.

pub mod mapping;
pub mod tiny;

pub use mapping::{Mapping, MemberKey};
pub use tiny::{TinyFile, TinyVersion};

use std::path::Path;

use anyhow::Result;

/// Loads every file and extracts `from -> to`, preserving file order.
pub fn load_mappings(paths: &[impl AsRef<Path>], from: &str, to: &str) -> Result<Vec<Mapping>> {
    paths
        .iter()
        .map(|p| TinyFile::read(p.as_ref())?.mapping(from, to))
        .collect()
}
