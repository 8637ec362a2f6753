//! Classweave Core
//!
//! Transformation and injection engine for JVM class archives.
//!
//! Each class of an archive is renamed from one symbol namespace to another
//! and, when a definition targets it, given synthetic fields, accessors and
//! interfaces. Classes outside the archive that touch synthetic members are
//! redirected to generated Holder bridges. Types that only exist because of
//! injection get stub skeletons.
//!
//! # Core Modules
//!
//! - [`definition`]: synthetic member definitions and their canonical digest
//! - [`hierarchy`]: inheritance index used to resolve declaring classes
//! - [`remapper`]: renaming engine and its late-bound [`RemapperHandle`]
//! - [`pipeline`]: the per-class visitor chain
//! - [`injector`] / [`remap_stage`] / [`analyzer`]: the stages of that chain
//! - [`emitter`]: demand-driven generated artifacts
//! - [`stubs`]: stub synthesis with a build-wide ledger
//! - [`manifest`]: mixin configuration and metadata registration
//! - [`cache`]: content-hash trailers for incremental builds
//! - [`processor`]: one archive end to end
//!
//! # Example
//!
//! ```ignore
//! use classweave_core::{process_artifact, ArtifactJob, BuildContext, DefinitionSet, ProcessOptions};
//!
//! let definitions = DefinitionSet::load(Path::new("definitions.json"))?;
//! let ctx = BuildContext::new(definitions, mappings, ProcessOptions::default());
//! let report = process_artifact(&ctx, &ArtifactJob::in_place("mods/example.jar"))?;
//! ```

#![allow(clippy::too_many_arguments)]

pub mod analyzer;
pub mod cache;
pub mod definition;
pub mod emitter;
pub mod error;
pub mod hierarchy;
pub mod injector;
pub mod manifest;
pub mod pipeline;
pub mod processor;
pub mod remap_stage;
pub mod remapper;
pub mod stubs;

pub use analyzer::{ReferenceAnalyzer, ReferenceRole, ReferenceSet};
pub use cache::{compute_hash, is_stale, read_trailer, ContentHash, TRAILER_ENTRY};
pub use definition::{AccessorKind, ClassDefinition, DefinitionSet, SyntheticMember};
pub use emitter::{ArtifactKind, EmitterRegistry, EmitterState};
pub use error::{find_weave_error, WeaveError};
pub use hierarchy::InheritanceIndex;
pub use pipeline::{ClassOutcome, ClassPipeline};
pub use processor::{process_artifact, ArtifactJob, ArtifactReport, BuildContext, ProcessOptions};
pub use remapper::{Remapper, RemapperBuilder, RemapperHandle};
pub use stubs::{StubLedger, StubShape};
