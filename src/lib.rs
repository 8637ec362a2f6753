//! Classweave
//!
//! Command-line front end for the classweave engine:
//!
//! - **process**: rename, inject into and stub one or more jar archives
//! - **hash**: print the content hash of a definition set
//! - **check**: report whether an archive was built from the current definitions
//!
//! The engine itself lives in `classweave-core`; see
//! [`classweave_core::processor`] for the per-archive flow.

pub mod args;
pub mod config;
pub mod logging;
pub mod runner;
