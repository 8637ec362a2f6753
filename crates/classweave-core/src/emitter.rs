//! # Emitter Subsystem
//!
//! One [`Emitter`] per defined class with synthetic members. While the
//! pipeline passes over an artifact it records which generated artifact
//! kinds are actually needed; after the pass the registry materializes only
//! those kinds.
//!
//! ## Artifact kinds
//!
//! | Kind | Name | Content |
//! |------|------|---------|
//! | `Holder` | `<group>/holder/<owner>Holder` | static storage, static accessors, static bridges for rewritten call sites |
//! | `Interface` | `<group>/itf/<owner>Interface` | abstract get/set pairs for instance fields |
//! | `Mixin` | `<group>/mixin/m/<owner>Mixin` | override-framework class adding the instance fields to `<owner>` |
//! | `Accessor` | `<group>/mixin/a/<owner>Accessor` | override-framework accessor/invoker interface for existing members |
//!
//! ## State machine
//!
//! ```text
//! Idle ──observe(kind)──► Observed(kinds) ──materialize──► Materialized(kinds)
//!                           │    ▲
//!                           └────┘ observe(kind)
//! ```
//!
//! `should_emit` and `materialize` are refused until
//! [`EmitterRegistry::finish_pass`] has been called. Materialization reads
//! final member names through the [`RemapperHandle`], so it fails with
//! `StaleReadBeforeReady` if the engine has not been bound yet.

use std::cmp::max;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tracing::{debug, info};

use classweave_classfile::access::*;
use classweave_classfile::annotation::{invisible_annotations, visible_annotations, Annotation, ElementValue};
use classweave_classfile::opcodes::*;
use classweave_classfile::{
    Attribute, ClassBuilder, ClassFile, ClassReader, ClassWriter, CodeAttribute, CodeBuilder, ConstantPool,
    MethodDescriptor,
};

use crate::definition::{AccessorKind, ClassDefinition, DefinitionSet, SyntheticMember};
use crate::remap_stage::RemapStage;
use crate::remapper::{Remapper, RemapperHandle};

pub const MIXIN_ANNOTATION: &str = "Lorg/spongepowered/asm/mixin/Mixin;";
pub const UNIQUE_ANNOTATION: &str = "Lorg/spongepowered/asm/mixin/Unique;";
pub const ACCESSOR_ANNOTATION: &str = "Lorg/spongepowered/asm/mixin/gen/Accessor;";
pub const INVOKER_ANNOTATION: &str = "Lorg/spongepowered/asm/mixin/gen/Invoker;";

// =============================================================================
// Kinds and state
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    Holder,
    Interface,
    Mixin,
    Accessor,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Holder,
        ArtifactKind::Interface,
        ArtifactKind::Mixin,
        ArtifactKind::Accessor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Holder => "holder",
            ArtifactKind::Interface => "interface",
            ArtifactKind::Mixin => "mixin",
            ArtifactKind::Accessor => "accessor",
        }
    }

    /// Whether the artifact is listed in the override-framework manifest.
    pub fn is_mixin_config_entry(&self) -> bool {
        matches!(self, ArtifactKind::Mixin | ArtifactKind::Accessor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EmitterState {
    #[default]
    Idle,
    Observed(BTreeSet<ArtifactKind>),
    Materialized(BTreeSet<ArtifactKind>),
}

impl EmitterState {
    pub fn kinds(&self) -> Option<&BTreeSet<ArtifactKind>> {
        match self {
            EmitterState::Idle => None,
            EmitterState::Observed(kinds) | EmitterState::Materialized(kinds) => Some(kinds),
        }
    }
}

/// Internal names of the artifacts generated for one owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub holder: String,
    pub interface: String,
    pub mixin: String,
    pub accessor: String,
}

impl ArtifactNames {
    pub fn new(group: &str, owner: &str) -> Self {
        Self {
            holder: format!("{}/holder/{}Holder", group, owner),
            interface: format!("{}/itf/{}Interface", group, owner),
            mixin: format!("{}/mixin/m/{}Mixin", group, owner),
            accessor: format!("{}/mixin/a/{}Accessor", group, owner),
        }
    }

    pub fn get(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Holder => &self.holder,
            ArtifactKind::Interface => &self.interface,
            ArtifactKind::Mixin => &self.mixin,
            ArtifactKind::Accessor => &self.accessor,
        }
    }
}

/// Descriptor of a static bridge for an instance member: the receiver
/// becomes the first parameter.
pub fn instance_bridge_descriptor(owner: &str, descriptor: &str) -> String {
    format!("(L{};{}", owner, descriptor.strip_prefix('(').unwrap_or(descriptor))
}

#[derive(Debug, Clone)]
pub struct MaterializedArtifact {
    pub owner: String,
    pub kind: ArtifactKind,
    /// Internal name of the generated class.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl MaterializedArtifact {
    pub fn entry_name(&self) -> String {
        format!("{}.class", self.name)
    }
}

// =============================================================================
// Emitter
// =============================================================================

#[derive(Debug, Clone)]
pub struct Emitter {
    definition: ClassDefinition,
    names: ArtifactNames,
    state: EmitterState,
}

impl Emitter {
    pub fn new(definition: ClassDefinition, group: &str) -> Self {
        let names = ArtifactNames::new(group, &definition.name);
        Self {
            definition,
            names,
            state: EmitterState::Idle,
        }
    }

    pub fn owner(&self) -> &str {
        &self.definition.name
    }

    pub fn names(&self) -> &ArtifactNames {
        &self.names
    }

    pub fn state(&self) -> &EmitterState {
        &self.state
    }

    pub fn observe(&mut self, kind: ArtifactKind) -> Result<()> {
        match &mut self.state {
            state @ EmitterState::Idle => {
                *state = EmitterState::Observed(BTreeSet::from([kind]));
            }
            EmitterState::Observed(kinds) => {
                kinds.insert(kind);
            }
            EmitterState::Materialized(_) => bail!(
                "{} artifact for {} observed after materialization",
                kind.as_str(),
                self.definition.name
            ),
        }
        Ok(())
    }

    fn is_observed(&self, kind: ArtifactKind) -> bool {
        matches!(&self.state, EmitterState::Observed(kinds) if kinds.contains(&kind))
    }

    fn materialize(&mut self, handle: &RemapperHandle) -> Result<Vec<MaterializedArtifact>> {
        let EmitterState::Observed(kinds) = &self.state else {
            return Ok(Vec::new());
        };
        let kinds = kinds.clone();
        let owner = self.definition.name.clone();
        let remapper = handle.get(&format!("generated artifacts of {}", owner))?;

        let mut out = Vec::new();
        for kind in &kinds {
            let class = match kind {
                ArtifactKind::Holder => self.holder(&kinds)?,
                ArtifactKind::Interface => self.interface()?,
                ArtifactKind::Mixin => self.mixin()?,
                ArtifactKind::Accessor => self.accessor(handle)?,
            };
            let bytes = finish_artifact(class, &remapper)?;
            let name = self.names.get(*kind).to_string();
            debug!("Materialized {} {} ({} bytes)", kind.as_str(), name, bytes.len());
            out.push(MaterializedArtifact {
                owner: owner.clone(),
                kind: *kind,
                name,
                bytes,
            });
        }
        self.state = EmitterState::Materialized(kinds);
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Holder
    // -------------------------------------------------------------------------

    fn holder(&self, kinds: &BTreeSet<ArtifactKind>) -> Result<ClassFile> {
        let owner = &self.definition.name;
        let holder = &self.names.holder;
        let mut b = ClassBuilder::new(holder, Some("java/lang/Object"), ACC_PUBLIC | ACC_FINAL | ACC_SUPER)?;

        for member in self.definition.static_fields() {
            let ty = member.field_type()?;
            let slots = ty.slots();
            b.add_field(ACC_PUBLIC | ACC_STATIC, &member.name, &member.descriptor)?;
            let field_ref = b.pool_mut().add_field_ref(holder, &member.name, &member.descriptor)?;

            let mut get = CodeBuilder::new(slots, 0);
            get.field(GETSTATIC, field_ref).op(ty.return_opcode());
            b.add_method(
                ACC_PUBLIC | ACC_STATIC,
                &member.getter_name(),
                &member.getter_descriptor(),
                Some(get.finish()),
            )?;

            let mut set = CodeBuilder::new(slots, slots);
            set.load(&ty, 0).field(PUTSTATIC, field_ref).op(RETURN);
            b.add_method(
                ACC_PUBLIC | ACC_STATIC,
                &member.setter_name(),
                &member.setter_descriptor(),
                Some(set.finish()),
            )?;
        }

        if kinds.contains(&ArtifactKind::Interface) {
            let itf = &self.names.interface;
            for member in self.definition.instance_fields() {
                for method in member.accessor_methods() {
                    let code = receiver_bridge(b.pool_mut(), itf, &method.name, &method.descriptor)?;
                    b.add_method(
                        ACC_PUBLIC | ACC_STATIC,
                        &method.name,
                        &instance_bridge_descriptor(owner, &method.descriptor),
                        Some(code),
                    )?;
                }
            }
        }

        if kinds.contains(&ArtifactKind::Accessor) {
            let acc = &self.names.accessor;
            for member in self.definition.targeted_members() {
                for method in member.accessor_methods() {
                    if method.is_static {
                        let code = static_bridge(b.pool_mut(), acc, &method.name, &method.descriptor)?;
                        b.add_method(ACC_PUBLIC | ACC_STATIC, &method.name, &method.descriptor, Some(code))?;
                    } else {
                        let code = receiver_bridge(b.pool_mut(), acc, &method.name, &method.descriptor)?;
                        b.add_method(
                            ACC_PUBLIC | ACC_STATIC,
                            &method.name,
                            &instance_bridge_descriptor(owner, &method.descriptor),
                            Some(code),
                        )?;
                    }
                }
            }
        }
        Ok(b.build())
    }

    // -------------------------------------------------------------------------
    // Interface and Mixin
    // -------------------------------------------------------------------------

    fn interface(&self) -> Result<ClassFile> {
        let mut b = ClassBuilder::new(
            &self.names.interface,
            Some("java/lang/Object"),
            ACC_PUBLIC | ACC_ABSTRACT | ACC_INTERFACE,
        )?;
        for member in self.definition.instance_fields() {
            for method in member.accessor_methods() {
                b.add_method(ACC_PUBLIC | ACC_ABSTRACT, &method.name, &method.descriptor, None)?;
            }
        }
        Ok(b.build())
    }

    fn mixin(&self) -> Result<ClassFile> {
        let mixin = &self.names.mixin;
        let mut b = ClassBuilder::new(mixin, Some("java/lang/Object"), ACC_PUBLIC | ACC_ABSTRACT | ACC_SUPER)?;
        b.add_interface(&self.names.interface)?;
        let target = mixin_target(b.pool_mut(), &self.definition.name)?;
        b.add_attribute(target);

        for member in self.definition.instance_fields() {
            let ty = member.field_type()?;
            let slots = ty.slots();
            let unique = {
                let pool = b.pool_mut();
                let ann = Annotation::new(pool, UNIQUE_ANNOTATION)?;
                invisible_annotations(pool, &[ann])?
            };
            b.add_field(ACC_PRIVATE, &member.name, &member.descriptor)?
                .attributes
                .push(unique);
            let field_ref = b.pool_mut().add_field_ref(mixin, &member.name, &member.descriptor)?;

            let mut get = CodeBuilder::new(max(1, slots), 1);
            get.aload(0).field(GETFIELD, field_ref).op(ty.return_opcode());
            b.add_method(ACC_PUBLIC, &member.getter_name(), &member.getter_descriptor(), Some(get.finish()))?;

            let mut set = CodeBuilder::new(1 + slots, 1 + slots);
            set.aload(0).load(&ty, 1).field(PUTFIELD, field_ref).op(RETURN);
            b.add_method(ACC_PUBLIC, &member.setter_name(), &member.setter_descriptor(), Some(set.finish()))?;
        }
        Ok(b.build())
    }

    // -------------------------------------------------------------------------
    // Accessor
    // -------------------------------------------------------------------------

    fn accessor(&self, handle: &RemapperHandle) -> Result<ClassFile> {
        let owner = &self.definition.name;
        let mut b = ClassBuilder::new(
            &self.names.accessor,
            Some("java/lang/Object"),
            ACC_PUBLIC | ACC_ABSTRACT | ACC_INTERFACE,
        )?;
        let target = mixin_target(b.pool_mut(), owner)?;
        b.add_attribute(target);

        for member in self.definition.targeted_members() {
            let (annotation, mapped) = target_annotation(member, owner, handle)?;
            for method in member.accessor_methods() {
                let attr = {
                    let pool = b.pool_mut();
                    let value = ElementValue::string(pool, &mapped)?;
                    let ann = Annotation::new(pool, annotation)?.with_element(pool, "value", value)?;
                    visible_annotations(pool, &[ann])?
                };
                let added = if method.is_static {
                    let code = assertion_body(b.pool_mut(), &method.descriptor)?;
                    b.add_method(ACC_PUBLIC | ACC_STATIC, &method.name, &method.descriptor, Some(code))?
                } else {
                    b.add_method(ACC_PUBLIC | ACC_ABSTRACT, &method.name, &method.descriptor, None)?
                };
                added.attributes.push(attr);
            }
        }
        Ok(b.build())
    }
}

/// Annotation type and final target name for a targeted member.
fn target_annotation(
    member: &SyntheticMember,
    owner: &str,
    handle: &RemapperHandle,
) -> Result<(&'static str, String)> {
    let target = member
        .accessor
        .target()
        .ok_or_else(|| anyhow!("{}.{} has no target member", owner, member.name))?;
    Ok(match member.accessor {
        AccessorKind::Passthrough { .. } => (
            INVOKER_ANNOTATION,
            handle.map_method_name(owner, target, &member.descriptor)?,
        ),
        _ => (
            ACCESSOR_ANNOTATION,
            handle.map_field_name(owner, target, &member.descriptor)?,
        ),
    })
}

/// `@Mixin(value = {Owner.class})`, invisible at runtime.
fn mixin_target(pool: &mut ConstantPool, owner: &str) -> Result<Attribute> {
    let class = ElementValue::class(pool, &format!("L{};", owner))?;
    let ann = Annotation::new(pool, MIXIN_ANNOTATION)?.with_element(pool, "value", ElementValue::Array(vec![class]))?;
    invisible_annotations(pool, &[ann])
}

/// Static method taking the receiver first, casting it to `target_itf` and
/// calling `name` on it.
fn receiver_bridge(
    pool: &mut ConstantPool,
    target_itf: &str,
    name: &str,
    descriptor: &str,
) -> Result<CodeAttribute> {
    let md = MethodDescriptor::parse(descriptor)?;
    let params = md.param_slots();
    let class_ref = pool.add_class(target_itf)?;
    let method_ref = pool.add_interface_method_ref(target_itf, name, descriptor)?;

    let mut code = CodeBuilder::new(max(1 + params, md.return_slots()), 1 + params);
    code.aload(0).type_insn(CHECKCAST, class_ref);
    code.load_all(&md.params, 1);
    code.invoke_interface(method_ref, params)?.op(md.return_opcode());
    Ok(code.finish())
}

/// Static method forwarding to static interface method `name` of `target_itf`.
fn static_bridge(
    pool: &mut ConstantPool,
    target_itf: &str,
    name: &str,
    descriptor: &str,
) -> Result<CodeAttribute> {
    let md = MethodDescriptor::parse(descriptor)?;
    let params = md.param_slots();
    let method_ref = pool.add_interface_method_ref(target_itf, name, descriptor)?;

    let mut code = CodeBuilder::new(max(params, md.return_slots()), params);
    code.load_all(&md.params, 0);
    code.invoke(INVOKESTATIC, method_ref).op(md.return_opcode());
    Ok(code.finish())
}

/// `throw new AssertionError()`; the override framework replaces the body.
fn assertion_body(pool: &mut ConstantPool, descriptor: &str) -> Result<CodeAttribute> {
    let md = MethodDescriptor::parse(descriptor)?;
    let class_ref = pool.add_class("java/lang/AssertionError")?;
    let init = pool.add_method_ref("java/lang/AssertionError", "<init>", "()V")?;
    let mut code = CodeBuilder::new(2, md.param_slots());
    code.type_insn(NEW, class_ref)
        .op(DUP)
        .invoke(INVOKESPECIAL, init)
        .op(ATHROW);
    Ok(code.finish())
}

/// Serializes a generated class through the renaming stage so that every
/// reference it makes to mapped types comes out in the target namespace.
fn finish_artifact(class: ClassFile, remapper: &Arc<Remapper>) -> Result<Vec<u8>> {
    let mut writer = ClassWriter::new();
    let mut stage = RemapStage::new(Arc::clone(remapper), &mut writer);
    ClassReader::from_class(class).accept(&mut stage)?;
    writer.into_bytes()
}

// =============================================================================
// Registry
// =============================================================================

/// All emitters of one artifact.
#[derive(Debug)]
pub struct EmitterRegistry {
    group: String,
    emitters: BTreeMap<String, Emitter>,
    pass_finished: bool,
}

impl EmitterRegistry {
    pub fn new(definitions: &DefinitionSet, group: &str) -> Self {
        let emitters = definitions
            .classes()
            .filter(|def| def.has_members())
            .map(|def| (def.name.clone(), Emitter::new(def.clone(), group)))
            .collect();
        Self {
            group: group.to_string(),
            emitters,
            pass_finished: false,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }

    pub fn emitter(&self, owner: &str) -> Option<&Emitter> {
        self.emitters.get(owner)
    }

    pub fn names(&self, owner: &str) -> Option<&ArtifactNames> {
        self.emitters.get(owner).map(Emitter::names)
    }

    pub fn state(&self, owner: &str) -> Option<&EmitterState> {
        self.emitters.get(owner).map(Emitter::state)
    }

    pub fn observe(&mut self, owner: &str, kind: ArtifactKind) -> Result<()> {
        if self.pass_finished {
            bail!("{} artifact for {} observed after the pass finished", kind.as_str(), owner);
        }
        self.emitters
            .get_mut(owner)
            .ok_or_else(|| anyhow!("no emitter for {}", owner))?
            .observe(kind)
    }

    /// Marks the pipeline pass over the artifact as complete.
    pub fn finish_pass(&mut self) {
        self.pass_finished = true;
    }

    pub fn is_pass_finished(&self) -> bool {
        self.pass_finished
    }

    pub fn should_emit(&self, owner: &str, kind: ArtifactKind) -> Result<bool> {
        if !self.pass_finished {
            bail!("should_emit({}, {}) queried before the pass finished", owner, kind.as_str());
        }
        Ok(self
            .emitters
            .get(owner)
            .map(|e| e.is_observed(kind))
            .unwrap_or(false))
    }

    /// Internal names of every artifact that will be materialized.
    pub fn planned_artifacts(&self) -> BTreeSet<String> {
        self.emitters
            .values()
            .flat_map(|e| {
                e.state
                    .kinds()
                    .into_iter()
                    .flatten()
                    .map(move |k| e.names.get(*k).to_string())
            })
            .collect()
    }

    pub fn materialize(&mut self, handle: &RemapperHandle) -> Result<Vec<MaterializedArtifact>> {
        if !self.pass_finished {
            bail!("artifacts materialized before the pass finished");
        }
        let mut out = Vec::new();
        for emitter in self.emitters.values_mut() {
            out.extend(emitter.materialize(handle)?);
        }
        if !out.is_empty() {
            info!("Generated {} artifacts in group {}", out.len(), self.group);
        }
        Ok(out)
    }

    /// Internal names of materialized artifacts the override framework loads.
    pub fn mixin_classes(&self) -> Vec<String> {
        self.emitters
            .values()
            .filter_map(|e| match &e.state {
                EmitterState::Materialized(kinds) => Some((e, kinds)),
                _ => None,
            })
            .flat_map(|(e, kinds)| {
                kinds
                    .iter()
                    .filter(|k| k.is_mixin_config_entry())
                    .map(move |k| e.names.get(*k).to_string())
            })
            .collect()
    }
}
