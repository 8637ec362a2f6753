//! Processing of one archive end to end.
//!
//! Order of work for an [`ArtifactJob`]:
//!
//! 1. Fail with `MissingInput` before anything is written.
//! 2. Skip when the output already carries the current definition digest.
//! 3. Index the input's classes, then layer the classpath index, which is
//!    read once per [`BuildContext`].
//! 4. Bind the renaming engine and run each class through the
//!    [`ClassPipeline`].
//! 5. Close the emitter pass, synthesize stubs from the reference delta,
//!    materialize generated artifacts and write the mixin manifest.
//! 6. Stage the output and, if one is configured, the shared stub archive.
//!    Both are published only once both are staged, so a failure before
//!    this step leaves every existing file untouched.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use classweave_archive::{entry_names, paths, read_archive, stage_archive, ArchiveEntry, PendingArchive};
use classweave_mappings::Mapping;

use crate::analyzer::ReferenceSet;
use crate::cache::{compute_hash, group_id, is_stale, trailer_entry, ContentHash, TRAILER_ENTRY};
use crate::definition::DefinitionSet;
use crate::emitter::EmitterRegistry;
use crate::error::WeaveError;
use crate::hierarchy::InheritanceIndex;
use crate::manifest::{config_entry_name, register_config, MixinConfig, DEFAULT_METADATA_ENTRY};
use crate::pipeline::ClassPipeline;
use crate::remapper::{RemapperBuilder, RemapperHandle};
use crate::stubs::{default_reserved_prefixes, StubClass, StubLedger, StubSynthesizer};

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Archives consulted for hierarchy and member resolution only.
    pub classpath: Vec<PathBuf>,
    /// Shared archive receiving stubs. When unset, stubs go into each output.
    pub stubs_archive: Option<PathBuf>,
    pub metadata_entry: String,
    pub reserved_prefixes: Vec<String>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            classpath: Vec::new(),
            stubs_archive: None,
            metadata_entry: DEFAULT_METADATA_ENTRY.to_string(),
            reserved_prefixes: default_reserved_prefixes(),
        }
    }
}

/// State shared by every job of one build.
#[derive(Debug)]
pub struct BuildContext {
    definitions: Arc<DefinitionSet>,
    digest: ContentHash,
    mappings: Vec<Arc<Mapping>>,
    options: ProcessOptions,
    ledger: StubLedger,
    stubs_lock: Mutex<()>,
    classpath: Mutex<Option<Arc<InheritanceIndex>>>,
}

impl BuildContext {
    pub fn new(definitions: DefinitionSet, mappings: Vec<Mapping>, options: ProcessOptions) -> Self {
        let digest = compute_hash(&definitions);
        Self {
            definitions: Arc::new(definitions),
            digest,
            mappings: mappings.into_iter().map(Arc::new).collect(),
            options,
            ledger: StubLedger::new(),
            stubs_lock: Mutex::new(()),
            classpath: Mutex::new(None),
        }
    }

    /// Index of every classpath archive, read on first use.
    pub fn classpath_index(&self) -> Result<Arc<InheritanceIndex>> {
        let mut slot = self.classpath.lock();
        if let Some(index) = slot.as_ref() {
            return Ok(index.clone());
        }
        let mut index = InheritanceIndex::new();
        for archive in &self.options.classpath {
            debug!("Remap classpath: {}", archive.display());
            index.add_archive(archive)?;
        }
        let index = Arc::new(index);
        *slot = Some(index.clone());
        Ok(index)
    }

    pub fn definitions(&self) -> &DefinitionSet {
        &self.definitions
    }

    pub fn digest(&self) -> &ContentHash {
        &self.digest
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    pub fn ledger(&self) -> &StubLedger {
        &self.ledger
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl ArtifactJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    pub fn in_place(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            input: path.clone(),
            output: path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactReport {
    pub output: PathBuf,
    /// True when the output was already up to date and nothing was written.
    pub skipped: bool,
    pub group: String,
    pub transformed: Vec<String>,
    pub stubs: Vec<String>,
    pub artifacts: Vec<String>,
    pub mixin_config: Option<String>,
}

pub fn process_artifact(ctx: &BuildContext, job: &ArtifactJob) -> Result<ArtifactReport> {
    if !job.input.exists() {
        return Err(WeaveError::MissingInput {
            path: job.input.clone(),
        }
        .into());
    }
    if !is_stale(&job.output, &ctx.digest)? {
        info!("{} is up to date", job.output.display());
        return Ok(ArtifactReport {
            output: job.output.clone(),
            skipped: true,
            ..Default::default()
        });
    }

    let entries = read_archive(&job.input)?;
    let present: HashSet<String> = entries
        .iter()
        .filter_map(|e| e.class_name())
        .map(str::to_string)
        .collect();

    let group = group_id(&ctx.digest, &paths::file_name(&job.input));
    let mut registry = EmitterRegistry::new(&ctx.definitions, &group);
    let handle = RemapperHandle::new();

    let mut index = InheritanceIndex::new();
    for entry in entries.iter().filter(|e| e.class_name().is_some()) {
        index
            .add_class_bytes(&entry.data)
            .with_context(|| format!("Failed to index {} in {}", entry.name, job.input.display()))?;
    }
    index.layer(&*ctx.classpath_index()?);
    let remapper = Arc::new(
        RemapperBuilder::new()
            .with_mappings(ctx.mappings.iter().cloned())
            .build(Arc::new(index))?,
    );
    handle.bind(remapper.clone())?;

    let mut report = ArtifactReport {
        output: job.output.clone(),
        group: group.clone(),
        ..Default::default()
    };
    let pipeline = ClassPipeline::new(&ctx.definitions, remapper.clone(), &present);
    let mut delta = ReferenceSet::new();
    let mut out_entries = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.name == TRAILER_ENTRY {
            continue;
        }
        if entry.class_name().is_none() {
            out_entries.push(entry);
            continue;
        }
        let outcome = pipeline
            .run(&entry.data, &mut registry)
            .with_context(|| format!("Failed to transform {} in {}", entry.name, job.input.display()))?;
        delta.merge(&outcome.delta());
        if outcome.changed {
            info!(
                "Transformed {} -> {} ({} injected, {} call sites)",
                outcome.source_name, outcome.mapped_name, outcome.injected, outcome.rewritten
            );
            report.transformed.push(outcome.mapped_name.clone());
        }
        out_entries.push(ArchiveEntry::file(paths::class_entry_name(&outcome.mapped_name), outcome.bytes));
    }
    for def in ctx.definitions.classes() {
        if !present.contains(&def.name) {
            debug!("{} is not in {}; only call sites are redirected", def.name, job.input.display());
        }
    }
    registry.finish_pass();

    let existing_names: HashSet<String> = match &ctx.options.stubs_archive {
        Some(path) if path.exists() => entry_names(path)?
            .iter()
            .filter_map(|name| paths::internal_name(name))
            .map(str::to_string)
            .collect(),
        _ => HashSet::new(),
    };
    let generated = registry.planned_artifacts();
    let stubs = StubSynthesizer::new(
        &ctx.options.reserved_prefixes,
        &remapper,
        &generated,
        &existing_names,
        &ctx.ledger,
    )
    .synthesize(&delta)?;
    report.stubs = stubs.iter().map(|s| s.name.clone()).collect();

    for artifact in registry.materialize(&handle)? {
        report.artifacts.push(artifact.name.clone());
        out_entries.push(ArchiveEntry::file(artifact.entry_name(), artifact.bytes));
    }

    let mixins = registry.mixin_classes();
    if !mixins.is_empty() {
        let config_name = config_entry_name(&group);
        match out_entries.iter_mut().find(|e| e.name == ctx.options.metadata_entry) {
            Some(metadata) => {
                metadata.data = register_config(&metadata.data, &config_name)
                    .with_context(|| format!("Failed to update {}", ctx.options.metadata_entry))?;
            }
            None => warn!(
                "{} has no {}; {} must be registered by hand",
                job.input.display(),
                ctx.options.metadata_entry,
                config_name
            ),
        }
        out_entries.push(MixinConfig::new(&group, &mixins).to_entry(&group)?);
        report.mixin_config = Some(config_name);
    }

    if ctx.options.stubs_archive.is_none() {
        out_entries.extend(stubs.iter().map(stub_entry));
    }
    out_entries.push(trailer_entry(&ctx.digest));

    let output = stage_archive(&job.output, &out_entries)?;
    match &ctx.options.stubs_archive {
        Some(path) if !stubs.is_empty() => publish_with_stubs(ctx, path, &stubs, output)?,
        _ => output.publish()?,
    }
    info!(
        "Wrote {} ({} classes transformed, {} artifacts, {} stubs)",
        job.output.display(),
        report.transformed.len(),
        report.artifacts.len(),
        report.stubs.len()
    );
    Ok(report)
}

fn stub_entry(stub: &StubClass) -> ArchiveEntry {
    ArchiveEntry::file(stub.entry_name(), stub.bytes.clone())
}

/// Stages the shared stub archive with `stubs` appended, then publishes it
/// together with the already staged output. Jobs running in parallel
/// serialize here so none of them overwrites another's additions.
fn publish_with_stubs(ctx: &BuildContext, path: &Path, stubs: &[StubClass], output: PendingArchive) -> Result<()> {
    let _guard = ctx.stubs_lock.lock();
    let mut entries = if path.exists() { read_archive(path)? } else { Vec::new() };
    let taken: BTreeSet<String> = entries.iter().map(|e| e.name.clone()).collect();
    entries.extend(stubs.iter().filter(|s| !taken.contains(&s.entry_name())).map(stub_entry));
    let staged = stage_archive(path, &entries)?;
    staged.publish()?;
    output.publish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::find_weave_error;

    #[test]
    fn test_missing_input_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = BuildContext::new(DefinitionSet::empty(), Vec::new(), ProcessOptions::default());
        let job = ArtifactJob::new(dir.path().join("absent.jar"), dir.path().join("out.jar"));

        let err = process_artifact(&ctx, &job).unwrap_err();
        assert!(matches!(find_weave_error(&err), Some(WeaveError::MissingInput { .. })));
        assert!(!job.output.exists());
    }

    #[test]
    fn test_classpath_is_indexed_once_per_build() {
        use classweave_classfile::access::{ACC_PUBLIC, ACC_SUPER};
        use classweave_classfile::ClassBuilder;

        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib.jar");
        let class = ClassBuilder::new("lib/Base", Some("java/lang/Object"), ACC_PUBLIC | ACC_SUPER)
            .unwrap()
            .build()
            .to_bytes()
            .unwrap();
        classweave_archive::write_archive(&lib, &[ArchiveEntry::file("lib/Base.class", class)]).unwrap();
        let options = ProcessOptions {
            classpath: vec![lib.clone()],
            ..Default::default()
        };
        let ctx = BuildContext::new(DefinitionSet::empty(), Vec::new(), options);

        let first = ctx.classpath_index().unwrap();
        assert!(first.contains("lib/Base"));
        std::fs::remove_file(&lib).unwrap();
        let second = ctx.classpath_index().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_default_options() {
        let options = ProcessOptions::default();
        assert_eq!(options.metadata_entry, "fabric.mod.json");
        assert!(options.reserved_prefixes.contains(&"java/".to_string()));
        assert!(options.stubs_archive.is_none());
    }
}
