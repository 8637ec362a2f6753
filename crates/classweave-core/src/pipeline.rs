//! Per-class visitor chain.
//!
//! ```text
//! ClassReader → ReferenceAnalyzer (pre) → Injector → ReferenceAnalyzer (post) → RemapStage → ClassWriter
//! ```
//!
//! Both analyzers see source-namespace names. The difference between their
//! reference sets is what injection introduced, and feeds stub synthesis.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;

use classweave_classfile::{ClassReader, ClassWriter};

use crate::analyzer::{ReferenceAnalyzer, ReferenceSet};
use crate::definition::DefinitionSet;
use crate::emitter::EmitterRegistry;
use crate::injector::Injector;
use crate::remap_stage::RemapStage;
use crate::remapper::Remapper;

#[derive(Debug, Clone)]
pub struct ClassOutcome {
    pub source_name: String,
    pub mapped_name: String,
    pub bytes: Vec<u8>,
    pub pre: ReferenceSet,
    pub post: ReferenceSet,
    pub injected: usize,
    pub rewritten: usize,
    /// False when the output is byte-identical to the input.
    pub changed: bool,
}

impl ClassOutcome {
    /// Names referenced only after injection.
    pub fn delta(&self) -> ReferenceSet {
        self.post.difference(&self.pre)
    }
}

pub struct ClassPipeline<'a> {
    definitions: &'a DefinitionSet,
    remapper: Arc<Remapper>,
    present: &'a HashSet<String>,
}

impl<'a> ClassPipeline<'a> {
    pub fn new(definitions: &'a DefinitionSet, remapper: Arc<Remapper>, present: &'a HashSet<String>) -> Self {
        Self {
            definitions,
            remapper,
            present,
        }
    }

    pub fn run(&self, bytes: &[u8], emitters: &mut EmitterRegistry) -> Result<ClassOutcome> {
        let reader = ClassReader::new(bytes)?;
        let source_name = reader.class().name()?.to_string();

        let mut writer = ClassWriter::new();
        let mut post = ReferenceAnalyzer::new(RemapStage::new(self.remapper.clone(), &mut writer));
        let mut injector =
            Injector::new(self.definitions, emitters, self.present, &mut post).with_hierarchy(self.remapper.index());
        let mut pre = ReferenceAnalyzer::new(&mut injector);
        reader.accept(&mut pre)?;

        let (pre_refs, _) = pre.into_parts();
        let (injected, rewritten) = (injector.injected(), injector.rewritten());
        drop(injector);
        let (post_refs, _) = post.into_parts();

        let class = writer.into_class()?;
        let mapped_name = class.name()?.to_string();
        let out = class.to_bytes()?;
        let changed = out.as_slice() != bytes;

        Ok(ClassOutcome {
            source_name,
            mapped_name,
            bytes: out,
            pre: pre_refs,
            post: post_refs,
            injected,
            rewritten,
            changed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ReferenceRole;
    use crate::definition::{ClassDefinition, SyntheticMember};
    use crate::hierarchy::InheritanceIndex;
    use crate::remapper::RemapperBuilder;
    use classweave_classfile::access::*;
    use classweave_classfile::opcodes::*;
    use classweave_classfile::{ClassBuilder, ClassFile, CodeBuilder};
    use classweave_mappings::Mapping;

    fn entity() -> Vec<u8> {
        let mut b = ClassBuilder::new("net/minecraft/class_1", Some("java/lang/Object"), ACC_PUBLIC | ACC_SUPER).unwrap();
        let init = b.pool_mut().add_method_ref("java/lang/Object", "<init>", "()V").unwrap();
        let mut code = CodeBuilder::new(1, 1);
        code.aload(0).invoke(INVOKESPECIAL, init).op(RETURN);
        b.add_method(ACC_PUBLIC, "<init>", "()V", Some(code.finish())).unwrap();
        b.build().to_bytes().unwrap()
    }

    fn remapper() -> Arc<Remapper> {
        let mut m = Mapping::new("intermediary", "named");
        m.add_class("net/minecraft/class_1", "net/minecraft/Entity");
        Arc::new(
            RemapperBuilder::new()
                .with_mapping(Arc::new(m))
                .build(Arc::new(InheritanceIndex::new()))
                .unwrap(),
        )
    }

    #[test]
    fn test_untargeted_class_is_only_renamed() {
        let defs = DefinitionSet::empty();
        let present = HashSet::from(["net/minecraft/class_1".to_string()]);
        let mut registry = EmitterRegistry::new(&defs, "g0");
        let pipeline = ClassPipeline::new(&defs, remapper(), &present);

        let outcome = pipeline.run(&entity(), &mut registry).unwrap();
        assert_eq!(outcome.source_name, "net/minecraft/class_1");
        assert_eq!(outcome.mapped_name, "net/minecraft/Entity");
        assert_eq!((outcome.injected, outcome.rewritten), (0, 0));
        assert!(outcome.changed);
        assert!(outcome.delta().is_empty());
    }

    #[test]
    fn test_identity_leaves_bytes_alone() {
        let defs = DefinitionSet::empty();
        let present = HashSet::new();
        let mut registry = EmitterRegistry::new(&defs, "g0");
        let identity = Arc::new(Remapper::identity(Arc::new(InheritanceIndex::new())));
        let pipeline = ClassPipeline::new(&defs, identity, &present);

        let input = entity();
        let outcome = pipeline.run(&input, &mut registry).unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.bytes, input);
    }

    #[test]
    fn test_delta_holds_injected_types() {
        let defs = DefinitionSet::new(vec![ClassDefinition::new("net/minecraft/class_1")
            .with_member(SyntheticMember::field("owner", "Lx/Missing;", false))
            .with_interface("x/Tickable")])
        .unwrap();
        let present = HashSet::from(["net/minecraft/class_1".to_string()]);
        let mut registry = EmitterRegistry::new(&defs, "g0");
        let pipeline = ClassPipeline::new(&defs, remapper(), &present);

        let outcome = pipeline.run(&entity(), &mut registry).unwrap();
        assert_eq!(outcome.injected, 4);
        let delta = outcome.delta();
        assert!(delta.roles("x/Missing").unwrap().contains(&ReferenceRole::Type));
        assert!(delta.roles("x/Tickable").unwrap().contains(&ReferenceRole::Interface));
        assert!(!delta.contains("net/minecraft/class_1"));

        let class = ClassFile::parse(&outcome.bytes).unwrap();
        assert_eq!(class.name().unwrap(), "net/minecraft/Entity");
        assert!(class.find_field("owner", "Lx/Missing;").is_some());
    }
}
