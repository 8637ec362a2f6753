//! Synthetic member injection stage.
//!
//! For a class with a definition, existing members stream through untouched
//! and are remembered; at `visit_end` the requested fields and accessor
//! methods are appended. Every class additionally has its call sites scanned:
//! accesses to synthetic members of defined classes that are *not* part of
//! the processed archive are redirected to static bridges on the owner's
//! Holder, since those members will only exist at runtime through the
//! generated override artifacts. A call site naming a subclass of a defined
//! class is redirected to the nearest defined supertype's bridge, unless the
//! subclass chain declares the member itself.
//!
//! All references embedded here use source-namespace names; the renaming
//! stage further down the chain translates them.

use std::cmp::max;
use std::collections::HashSet;

use anyhow::{anyhow, bail, Result};
use tracing::{debug, error};

use classweave_classfile::access::*;
use classweave_classfile::attribute::names;
use classweave_classfile::instruction::scan;
use classweave_classfile::opcodes::*;
use classweave_classfile::{
    Attribute, ClassHeader, ClassVisitor, CodeAttribute, CodeBuilder, ConstantPool, FieldType, MemberInfo,
    MemberRef, MethodDescriptor, RefKind,
};

use crate::definition::{AccessorKind, AccessorMethod, AccessorRole, ClassDefinition, DefinitionSet, SyntheticMember};
use crate::emitter::{instance_bridge_descriptor, ArtifactKind, EmitterRegistry};
use crate::error::WeaveError;
use crate::hierarchy::InheritanceIndex;

const FIELD_BRIDGE_KINDS: &[ArtifactKind] = &[ArtifactKind::Holder, ArtifactKind::Interface, ArtifactKind::Mixin];
const STATIC_FIELD_BRIDGE_KINDS: &[ArtifactKind] = &[ArtifactKind::Holder];
const TARGET_BRIDGE_KINDS: &[ArtifactKind] = &[ArtifactKind::Holder, ArtifactKind::Accessor];

#[derive(Debug, Clone)]
struct ExistingMember {
    name: String,
    descriptor: String,
    access_flags: u16,
}

impl ExistingMember {
    fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }
}

/// Replacement for one rewritten call site.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Bridge {
    name: String,
    descriptor: String,
    kinds: &'static [ArtifactKind],
}

pub struct Injector<'a, V> {
    definitions: &'a DefinitionSet,
    emitters: &'a mut EmitterRegistry,
    /// Classes of the archive being processed.
    present: &'a HashSet<String>,
    hierarchy: Option<&'a InheritanceIndex>,
    next: V,
    owner: String,
    is_interface: bool,
    fields: Vec<ExistingMember>,
    methods: Vec<ExistingMember>,
    injected: usize,
    rewritten: usize,
}

impl<'a, V> Injector<'a, V> {
    pub fn new(
        definitions: &'a DefinitionSet,
        emitters: &'a mut EmitterRegistry,
        present: &'a HashSet<String>,
        next: V,
    ) -> Self {
        Self {
            definitions,
            emitters,
            present,
            hierarchy: None,
            next,
            owner: String::new(),
            is_interface: false,
            fields: Vec::new(),
            methods: Vec::new(),
            injected: 0,
            rewritten: 0,
        }
    }

    /// Resolves call-site owners that are subclasses of defined classes.
    pub fn with_hierarchy(mut self, index: &'a InheritanceIndex) -> Self {
        self.hierarchy = Some(index);
        self
    }

    /// Number of members added to the class.
    pub fn injected(&self) -> usize {
        self.injected
    }

    /// Number of call sites redirected to Holder bridges.
    pub fn rewritten(&self) -> usize {
        self.rewritten
    }

    pub fn into_inner(self) -> V {
        self.next
    }

    fn definition(&self) -> Option<&'a ClassDefinition> {
        self.definitions.get(&self.owner)
    }

    fn conflict(&self, member: &SyntheticMember, descriptor: &str, reason: String) -> WeaveError {
        WeaveError::DefinitionConflict {
            owner: self.owner.clone(),
            name: member.name.clone(),
            descriptor: descriptor.to_string(),
            reason,
        }
    }

    // -------------------------------------------------------------------------
    // Call-site rewriting
    // -------------------------------------------------------------------------

    /// The defined class whose synthetic members a reference on `owner`
    /// reaches: `owner` itself or its nearest defined supertype.
    fn defined_owner(&self, owner: &str) -> Option<&'a ClassDefinition> {
        if let Some(def) = self.definitions.get(owner) {
            return Some(def);
        }
        let definitions = self.definitions;
        self.hierarchy?
            .supertypes(owner)
            .iter()
            .find_map(|name| definitions.get(name))
    }

    /// True when the reference resolves to a real member declared between
    /// the call-site owner and the defined class.
    fn shadowed(&self, opcode: u8, target: &MemberRef, defined: &str) -> bool {
        let Some(index) = self.hierarchy else {
            return false;
        };
        let declaring = match opcode {
            GETFIELD | PUTFIELD | GETSTATIC | PUTSTATIC => {
                index.resolve_field_owner(&target.owner, &target.name, &target.descriptor)
            }
            _ => index.resolve_method_owner(&target.owner, &target.name, &target.descriptor),
        };
        declaring.is_some_and(|name| name != defined)
    }

    fn bridge_for(&self, opcode: u8, def: &ClassDefinition, target: &MemberRef) -> Option<Bridge> {
        let bridge = |member: &SyntheticMember, name: String, descriptor: String, is_static: bool| {
            let kinds = match (member.is_field(), is_static) {
                (true, true) => STATIC_FIELD_BRIDGE_KINDS,
                (true, false) => FIELD_BRIDGE_KINDS,
                (false, _) => TARGET_BRIDGE_KINDS,
            };
            let descriptor = if is_static {
                descriptor
            } else {
                instance_bridge_descriptor(&def.name, &descriptor)
            };
            Bridge {
                name,
                descriptor,
                kinds,
            }
        };

        match opcode {
            GETFIELD | PUTFIELD | GETSTATIC | PUTSTATIC => {
                if target.kind != RefKind::Field {
                    return None;
                }
                let member = def.find_field(&target.name, &target.descriptor)?;
                let is_static = matches!(opcode, GETSTATIC | PUTSTATIC);
                if member.is_static != is_static {
                    return None;
                }
                let (name, descriptor) = if matches!(opcode, GETFIELD | GETSTATIC) {
                    (member.getter_name(), member.getter_descriptor())
                } else {
                    (member.setter_name(), member.setter_descriptor())
                };
                Some(bridge(member, name, descriptor, is_static))
            }
            INVOKEVIRTUAL | INVOKESTATIC => {
                let (member, method) = def.find_accessor(&target.name, &target.descriptor)?;
                if method.is_static != (opcode == INVOKESTATIC) {
                    return None;
                }
                Some(bridge(member, method.name, method.descriptor, method.is_static))
            }
            _ => None,
        }
    }

    /// Redirects accesses to synthetic members of absent classes. Every
    /// replacement is a three-byte `invokestatic`, so offsets, branch
    /// targets and stack map frames stay valid.
    fn rewrite_call_sites(&mut self, pool: &mut ConstantPool, attribute: &mut Attribute) -> Result<()> {
        let mut code = CodeAttribute::parse(&attribute.info)?;
        let mut changed = false;
        for insn in scan(&code.code)? {
            if insn.len != 3 || !matches!(insn.opcode, GETFIELD | PUTFIELD | GETSTATIC | PUTSTATIC | INVOKEVIRTUAL | INVOKESTATIC) {
                continue;
            }
            let Some(index) = insn.member_index(&code.code) else {
                continue;
            };
            let target = pool.member_ref(index)?;
            let Some(def) = self.defined_owner(&target.owner) else {
                continue;
            };
            if self.present.contains(&def.name) {
                continue;
            }
            if def.name != target.owner && self.shadowed(insn.opcode, &target, &def.name) {
                continue;
            }
            let Some(bridge) = self.bridge_for(insn.opcode, def, &target) else {
                continue;
            };
            for kind in bridge.kinds {
                self.emitters.observe(&def.name, *kind)?;
            }
            let holder = self
                .emitters
                .names(&def.name)
                .ok_or_else(|| anyhow!("no generated artifacts for {}", def.name))?
                .holder
                .clone();
            let method_ref = pool.add_method_ref(&holder, &bridge.name, &bridge.descriptor)?;
            code.code[insn.pc] = INVOKESTATIC;
            code.code[insn.pc + 1..insn.pc + 3].copy_from_slice(&method_ref.to_be_bytes());
            debug!(
                "{}: {}.{}:{} -> {}.{}{}",
                self.owner, target.owner, target.name, target.descriptor, holder, bridge.name, bridge.descriptor
            );
            self.rewritten += 1;
            changed = true;
        }
        if changed {
            attribute.info = code.to_bytes()?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Conflict checks
    // -------------------------------------------------------------------------

    fn find_field(&self, name: &str) -> Option<&ExistingMember> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn find_method(&self, name: &str, descriptor: &str) -> Option<&ExistingMember> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Decides what `member` adds to the class, or why it cannot be added.
    fn plan_member(&self, member: &SyntheticMember) -> Result<MemberPlan, WeaveError> {
        let conflict = |reason: String| self.conflict(member, &member.descriptor, reason);

        let mut methods = Vec::new();
        for method in member.accessor_methods() {
            match self.find_method(&method.name, &method.descriptor) {
                None => methods.push(method),
                Some(existing) if existing.is_static() == method.is_static => {}
                Some(_) => {
                    return Err(conflict(format!(
                        "method {}{} already exists with a different static flag",
                        method.name, method.descriptor
                    )))
                }
            }
        }

        let mut plan = MemberPlan {
            add_field: false,
            methods,
            target: None,
        };
        match &member.accessor {
            AccessorKind::Field if member.is_static => {}
            AccessorKind::Field => {
                if self.is_interface {
                    return Err(conflict("interfaces cannot hold instance fields".into()));
                }
                match self.find_field(&member.name) {
                    None => plan.add_field = true,
                    Some(f) if f.descriptor == member.descriptor && !f.is_static() => {}
                    Some(f) => {
                        return Err(conflict(format!(
                            "existing {} field has descriptor {}",
                            if f.is_static() { "static" } else { "instance" },
                            f.descriptor
                        )))
                    }
                }
            }
            AccessorKind::Getter { target } | AccessorKind::Setter { target } => match self.find_field(target) {
                None => return Err(conflict(format!("target field {} does not exist", target))),
                Some(f) if f.descriptor != member.descriptor => {
                    return Err(conflict(format!(
                        "target field {} has descriptor {}",
                        target, f.descriptor
                    )))
                }
                Some(f) if f.is_static() != member.is_static => {
                    return Err(conflict(format!(
                        "target field {} has a different static flag",
                        target
                    )))
                }
                Some(f) => plan.target = Some(f.clone()),
            },
            AccessorKind::Passthrough { target } => match self.find_method(target, &member.descriptor) {
                None => {
                    return Err(conflict(format!(
                        "target method {}{} does not exist",
                        target, member.descriptor
                    )))
                }
                Some(m) if m.is_static() != member.is_static => {
                    return Err(conflict(format!(
                        "target method {} has a different static flag",
                        target
                    )))
                }
                Some(m) => plan.target = Some(m.clone()),
            },
        }
        Ok(plan)
    }
}

/// What one synthetic member adds to its class.
#[derive(Debug)]
struct MemberPlan {
    add_field: bool,
    /// Accessor methods not already present.
    methods: Vec<AccessorMethod>,
    /// Existing field or method a targeted accessor reaches.
    target: Option<ExistingMember>,
}

impl<'a, V: ClassVisitor> Injector<'a, V> {
    // -------------------------------------------------------------------------
    // Injection
    // -------------------------------------------------------------------------

    fn inject_member(&mut self, pool: &mut ConstantPool, member: &SyntheticMember, plan: MemberPlan) -> Result<()> {
        match &member.accessor {
            AccessorKind::Field if member.is_static => {
                self.emitters.observe(&self.owner, ArtifactKind::Holder)?;
                let holder = self
                    .emitters
                    .names(&self.owner)
                    .ok_or_else(|| anyhow!("no generated artifacts for {}", self.owner))?
                    .holder
                    .clone();
                let field_ref = pool.add_field_ref(&holder, &member.name, &member.descriptor)?;
                for method in &plan.methods {
                    let code = field_body(member, method, field_ref, true)?;
                    self.emit_method(pool, method, code)?;
                }
            }
            AccessorKind::Field => {
                if plan.add_field {
                    let field = MemberInfo::new(pool, ACC_PRIVATE, &member.name, &member.descriptor)?;
                    self.injected += 1;
                    self.next.visit_field(pool, field)?;
                }
                let field_ref = pool.add_field_ref(&self.owner, &member.name, &member.descriptor)?;
                for method in &plan.methods {
                    let code = field_body(member, method, field_ref, false)?;
                    self.emit_method(pool, method, code)?;
                }
            }
            AccessorKind::Getter { target } | AccessorKind::Setter { target } => {
                let field_ref = pool.add_field_ref(&self.owner, target, &member.descriptor)?;
                for method in &plan.methods {
                    let code = field_body(member, method, field_ref, member.is_static)?;
                    self.emit_method(pool, method, code)?;
                }
            }
            AccessorKind::Passthrough { target } => {
                let existing = plan
                    .target
                    .as_ref()
                    .ok_or_else(|| anyhow!("{}.{} has no resolved target", self.owner, member.name))?;
                for method in &plan.methods {
                    let code = self.passthrough_body(pool, target, existing)?;
                    self.emit_method(pool, method, code)?;
                }
            }
        }
        Ok(())
    }

    fn passthrough_body(&self, pool: &mut ConstantPool, target: &str, existing: &ExistingMember) -> Result<CodeAttribute> {
        let md = MethodDescriptor::parse(&existing.descriptor)?;
        let params = md.param_slots();
        let method_ref = if self.is_interface {
            pool.add_interface_method_ref(&self.owner, target, &existing.descriptor)?
        } else {
            pool.add_method_ref(&self.owner, target, &existing.descriptor)?
        };

        if existing.is_static() {
            let mut code = CodeBuilder::new(max(params, md.return_slots()), params);
            code.load_all(&md.params, 0);
            code.invoke(INVOKESTATIC, method_ref).op(md.return_opcode());
            return Ok(code.finish());
        }

        let mut code = CodeBuilder::new(max(1 + params, md.return_slots()), 1 + params);
        code.aload(0);
        code.load_all(&md.params, 1);
        if existing.access_flags & ACC_PRIVATE != 0 {
            code.invoke(INVOKESPECIAL, method_ref);
        } else if self.is_interface {
            code.invoke_interface(method_ref, params)?;
        } else {
            code.invoke(INVOKEVIRTUAL, method_ref);
        }
        code.op(md.return_opcode());
        Ok(code.finish())
    }

    fn emit_method(&mut self, pool: &mut ConstantPool, method: &AccessorMethod, code: CodeAttribute) -> Result<()> {
        let access = if method.is_static { ACC_PUBLIC | ACC_STATIC } else { ACC_PUBLIC };
        let mut info = MemberInfo::new(pool, access, &method.name, &method.descriptor)?;
        info.attributes.push(code.into_attribute(pool)?);
        self.injected += 1;
        self.next.visit_method(pool, info)
    }
}

/// Straight-line get/set body over `field_ref`.
fn field_body(member: &SyntheticMember, method: &AccessorMethod, field_ref: u16, is_static: bool) -> Result<CodeAttribute> {
    let ty = FieldType::parse(&member.descriptor)?;
    let slots = ty.slots();
    let receiver: u16 = if is_static { 0 } else { 1 };
    let code = match method.role {
        AccessorRole::Get => {
            let mut code = CodeBuilder::new(max(receiver, slots), receiver);
            if !is_static {
                code.aload(0);
            }
            code.field(if is_static { GETSTATIC } else { GETFIELD }, field_ref)
                .op(ty.return_opcode());
            code
        }
        AccessorRole::Set => {
            let mut code = CodeBuilder::new(receiver + slots, receiver + slots);
            if !is_static {
                code.aload(0);
            }
            code.load(&ty, receiver)
                .field(if is_static { PUTSTATIC } else { PUTFIELD }, field_ref)
                .op(RETURN);
            code
        }
        AccessorRole::Invoke => bail!("{} is not a field accessor", method.name),
    };
    Ok(code.finish())
}

impl<'a, V: ClassVisitor> ClassVisitor for Injector<'a, V> {
    fn visit_header(&mut self, pool: &mut ConstantPool, mut header: ClassHeader) -> Result<()> {
        self.owner = pool.class_name(header.this_class)?.to_string();
        self.is_interface = header.access_flags & ACC_INTERFACE != 0;
        if let Some(def) = self.definition() {
            for itf in &def.interfaces {
                let index = pool.add_class(itf)?;
                if !header.interfaces.contains(&index) {
                    header.interfaces.push(index);
                    self.injected += 1;
                }
            }
        }
        self.next.visit_header(pool, header)
    }

    fn visit_field(&mut self, pool: &mut ConstantPool, field: MemberInfo) -> Result<()> {
        if self.definition().is_some() {
            self.fields.push(ExistingMember {
                name: field.name(pool)?.to_string(),
                descriptor: field.descriptor(pool)?.to_string(),
                access_flags: field.access_flags,
            });
        }
        self.next.visit_field(pool, field)
    }

    fn visit_method(&mut self, pool: &mut ConstantPool, mut method: MemberInfo) -> Result<()> {
        if self.definition().is_some() {
            self.methods.push(ExistingMember {
                name: method.name(pool)?.to_string(),
                descriptor: method.descriptor(pool)?.to_string(),
                access_flags: method.access_flags,
            });
        }
        for attribute in &mut method.attributes {
            if attribute.is(pool, names::CODE) {
                self.rewrite_call_sites(pool, attribute)?;
            }
        }
        self.next.visit_method(pool, method)
    }

    fn visit_attribute(&mut self, pool: &mut ConstantPool, attribute: Attribute) -> Result<()> {
        self.next.visit_attribute(pool, attribute)
    }

    fn visit_end(&mut self, pool: &mut ConstantPool) -> Result<()> {
        if let Some(def) = self.definition() {
            let mut plans = Vec::new();
            let mut conflicts = Vec::new();
            for member in &def.members {
                match self.plan_member(member) {
                    Ok(plan) => plans.push((member, plan)),
                    Err(err) => conflicts.push(err),
                }
            }
            for err in &conflicts {
                error!("{}", err);
            }
            if let Some(first) = conflicts.into_iter().next() {
                return Err(first.into());
            }
            for (member, plan) in plans {
                self.inject_member(pool, member, plan)?;
            }
        }
        self.next.visit_end(pool)
    }
}
