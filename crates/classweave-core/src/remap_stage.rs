//! Renaming stage of the visitor chain.
//!
//! Declarations and their attributes are renamed as each member passes.
//! Constant pool references (class entries, member references, method types,
//! dynamic call sites) are renamed in one sweep at `visit_end`, so every
//! earlier stage in the chain still reads source-namespace names from the
//! pool. Shared Utf8 entries are never edited: renamed strings are appended
//! and the referring entries repointed, which keeps unrelated uses of the
//! same string (string literals, other descriptors) intact.

use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use classweave_classfile::annotation::{
    parse_annotations, parse_parameter_annotations, write_annotations, write_parameter_annotations,
    Annotation, ElementValue,
};
use classweave_classfile::attribute::{
    names, parse_inner_classes, parse_local_variables, write_inner_classes, write_local_variables,
};
use classweave_classfile::{
    Attribute, ClassHeader, ClassVisitor, CodeAttribute, Constant, ConstantPool, MemberInfo, RefKind,
};

use crate::remapper::Remapper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberKind {
    Field,
    Method,
}

/// A pool entry rewrite computed before any entry is changed.
enum PlannedRewrite {
    Class(String),
    Member {
        kind: RefKind,
        class_index: u16,
        name: String,
        descriptor: String,
    },
    MethodType(String),
    Dynamic {
        invoke: bool,
        bootstrap_method_attr_index: u16,
        name: String,
        descriptor: String,
    },
}

pub struct RemapStage<V> {
    remapper: Arc<Remapper>,
    next: V,
    owner: String,
}

impl<V> RemapStage<V> {
    pub fn new(remapper: Arc<Remapper>, next: V) -> Self {
        Self {
            remapper,
            next,
            owner: String::new(),
        }
    }

    pub fn into_inner(self) -> V {
        self.next
    }

    /// Repoints `index` to a Utf8 holding `value` when it differs.
    fn repoint(pool: &mut ConstantPool, index: &mut u16, value: &str) -> Result<bool> {
        if pool.utf8(*index)? == value {
            return Ok(false);
        }
        *index = pool.add_utf8(value)?;
        Ok(true)
    }

    fn remap_signature_index(&self, pool: &mut ConstantPool, index: &mut u16) -> Result<bool> {
        let signature = pool.utf8(*index)?.to_string();
        match self.remapper.map_signature(&signature) {
            Ok(mapped) => Self::repoint(pool, index, &mapped),
            Err(e) => {
                warn!("Leaving signature {:?} in {} unrenamed: {}", signature, self.owner, e);
                Ok(false)
            }
        }
    }

    fn remap_element(&self, pool: &mut ConstantPool, value: &mut ElementValue) -> Result<bool> {
        Ok(match value {
            ElementValue::Const { .. } => false,
            ElementValue::Enum {
                type_name_index, ..
            } => {
                let desc = self.remapper.map_descriptor(pool.utf8(*type_name_index)?);
                Self::repoint(pool, type_name_index, &desc)?
            }
            ElementValue::Class { class_info_index } => {
                let desc = self.remapper.map_descriptor(pool.utf8(*class_info_index)?);
                Self::repoint(pool, class_info_index, &desc)?
            }
            ElementValue::Annotation(a) => self.remap_annotation(pool, a)?,
            ElementValue::Array(values) => {
                let mut changed = false;
                for v in values {
                    changed |= self.remap_element(pool, v)?;
                }
                changed
            }
        })
    }

    fn remap_annotation(&self, pool: &mut ConstantPool, annotation: &mut Annotation) -> Result<bool> {
        let desc = self.remapper.map_descriptor(pool.utf8(annotation.type_index)?);
        let mut changed = Self::repoint(pool, &mut annotation.type_index, &desc)?;
        for pair in &mut annotation.elements {
            changed |= self.remap_element(pool, &mut pair.value)?;
        }
        Ok(changed)
    }

    fn remap_code(&self, pool: &mut ConstantPool, attribute: &mut Attribute) -> Result<()> {
        let mut code = CodeAttribute::parse(&attribute.info)?;
        let mut changed = false;
        for sub in &mut code.attributes {
            let is_types = sub.is(pool, names::LOCAL_VARIABLE_TYPE_TABLE);
            if !is_types && !sub.is(pool, names::LOCAL_VARIABLE_TABLE) {
                continue;
            }
            let mut vars = parse_local_variables(&sub.info)?;
            let mut table_changed = false;
            for var in &mut vars {
                table_changed |= if is_types {
                    self.remap_signature_index(pool, &mut var.descriptor_index)?
                } else {
                    let desc = self.remapper.map_descriptor(pool.utf8(var.descriptor_index)?);
                    Self::repoint(pool, &mut var.descriptor_index, &desc)?
                };
            }
            if table_changed {
                sub.info = write_local_variables(&vars)?;
                changed = true;
            }
        }
        if changed {
            attribute.info = code.to_bytes()?;
        }
        Ok(())
    }

    /// Attributes shared by members and classes.
    fn remap_common_attribute(&self, pool: &mut ConstantPool, attribute: &mut Attribute) -> Result<()> {
        let name = attribute.name(pool)?.to_string();
        match name.as_str() {
            names::SIGNATURE => {
                let mut index = attribute.u16_payload()?;
                if self.remap_signature_index(pool, &mut index)? {
                    attribute.info = index.to_be_bytes().to_vec();
                }
            }
            names::RUNTIME_VISIBLE_ANNOTATIONS | names::RUNTIME_INVISIBLE_ANNOTATIONS => {
                let mut annotations = parse_annotations(&attribute.info)?;
                let mut changed = false;
                for a in &mut annotations {
                    changed |= self.remap_annotation(pool, a)?;
                }
                if changed {
                    attribute.info = write_annotations(&annotations)?;
                }
            }
            names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
            | names::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
                let mut params = parse_parameter_annotations(&attribute.info)?;
                let mut changed = false;
                for a in params.iter_mut().flatten() {
                    changed |= self.remap_annotation(pool, a)?;
                }
                if changed {
                    attribute.info = write_parameter_annotations(&params)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn remap_member(&self, pool: &mut ConstantPool, member: &mut MemberInfo, kind: MemberKind) -> Result<()> {
        let name = member.name(pool)?.to_string();
        let descriptor = member.descriptor(pool)?.to_string();
        let new_name = match kind {
            MemberKind::Field => self.remapper.map_field_name(&self.owner, &name, &descriptor),
            MemberKind::Method => self.remapper.map_method_name(&self.owner, &name, &descriptor),
        };
        let new_descriptor = self.remapper.map_descriptor(&descriptor);
        Self::repoint(pool, &mut member.name_index, &new_name)?;
        Self::repoint(pool, &mut member.descriptor_index, &new_descriptor)?;

        for attribute in &mut member.attributes {
            if kind == MemberKind::Method && attribute.is(pool, names::CODE) {
                self.remap_code(pool, attribute)?;
            } else {
                self.remap_common_attribute(pool, attribute)?;
            }
        }
        Ok(())
    }

    fn remap_inner_classes(&self, pool: &mut ConstantPool, attribute: &mut Attribute) -> Result<()> {
        let mut entries = parse_inner_classes(&attribute.info)?;
        let mut changed = false;
        for entry in &mut entries {
            if entry.inner_name_index == 0 {
                continue;
            }
            let inner = pool.class_name(entry.inner_class_info_index)?.to_string();
            let mapped_inner = self.remapper.map_class(&inner);
            if mapped_inner == inner {
                continue;
            }
            let prefix = if entry.outer_class_info_index != 0 {
                let outer = pool.class_name(entry.outer_class_info_index)?;
                Some(format!("{}$", self.remapper.map_class(outer)))
            } else {
                None
            };
            let simple = match prefix.as_deref().and_then(|p| mapped_inner.strip_prefix(p)) {
                Some(rest) => rest.to_string(),
                None => mapped_inner
                    .rsplit(['$', '/'])
                    .next()
                    .unwrap_or(&mapped_inner)
                    .to_string(),
            };
            changed |= Self::repoint(pool, &mut entry.inner_name_index, &simple)?;
        }
        if changed {
            attribute.info = write_inner_classes(&entries)?;
        }
        Ok(())
    }

    fn remap_enclosing_method(&self, pool: &mut ConstantPool, attribute: &mut Attribute) -> Result<()> {
        if attribute.info.len() != 4 {
            return Ok(());
        }
        let class_index = u16::from_be_bytes([attribute.info[0], attribute.info[1]]);
        let method_index = u16::from_be_bytes([attribute.info[2], attribute.info[3]]);
        if method_index == 0 {
            return Ok(());
        }
        let owner = pool.class_name(class_index)?.to_string();
        let (name, descriptor) = pool.name_and_type(method_index)?;
        let (name, descriptor) = (name.to_string(), descriptor.to_string());
        let new_name = self.remapper.map_method_name(&owner, &name, &descriptor);
        let new_descriptor = self.remapper.map_descriptor(&descriptor);
        if new_name != name || new_descriptor != descriptor {
            let nat = pool.add_name_and_type(&new_name, &new_descriptor)?;
            attribute.info[2..4].copy_from_slice(&nat.to_be_bytes());
        }
        Ok(())
    }

    /// Computes every pool rewrite against the original names, then applies them.
    fn remap_pool(&self, pool: &mut ConstantPool) -> Result<()> {
        let mut plan: Vec<(u16, PlannedRewrite)> = Vec::new();
        for (index, constant) in pool.iter() {
            match constant {
                Constant::Class { name_index } => {
                    let Ok(name) = pool.utf8(*name_index) else {
                        continue;
                    };
                    let mapped = self.remapper.map_class(name);
                    if mapped != name {
                        plan.push((index, PlannedRewrite::Class(mapped)));
                    }
                }
                Constant::FieldRef {
                    class_index,
                    name_and_type_index,
                }
                | Constant::MethodRef {
                    class_index,
                    name_and_type_index,
                }
                | Constant::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    let kind = match constant {
                        Constant::FieldRef { .. } => RefKind::Field,
                        Constant::MethodRef { .. } => RefKind::Method,
                        _ => RefKind::InterfaceMethod,
                    };
                    let owner = pool.class_name(*class_index)?;
                    let (name, descriptor) = pool.name_and_type(*name_and_type_index)?;
                    let new_name = match kind {
                        RefKind::Field => self.remapper.map_field_name(owner, name, descriptor),
                        _ => self.remapper.map_method_name(owner, name, descriptor),
                    };
                    let new_descriptor = self.remapper.map_descriptor(descriptor);
                    if new_name != name || new_descriptor != descriptor {
                        plan.push((
                            index,
                            PlannedRewrite::Member {
                                kind,
                                class_index: *class_index,
                                name: new_name,
                                descriptor: new_descriptor,
                            },
                        ));
                    }
                }
                Constant::MethodType { descriptor_index } => {
                    let descriptor = pool.utf8(*descriptor_index)?;
                    let mapped = self.remapper.map_descriptor(descriptor);
                    if mapped != descriptor {
                        plan.push((index, PlannedRewrite::MethodType(mapped)));
                    }
                }
                Constant::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                }
                | Constant::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => {
                    let (name, descriptor) = pool.name_and_type(*name_and_type_index)?;
                    let mapped = self.remapper.map_descriptor(descriptor);
                    if mapped != descriptor {
                        plan.push((
                            index,
                            PlannedRewrite::Dynamic {
                                invoke: matches!(constant, Constant::InvokeDynamic { .. }),
                                bootstrap_method_attr_index: *bootstrap_method_attr_index,
                                name: name.to_string(),
                                descriptor: mapped,
                            },
                        ));
                    }
                }
                _ => {}
            }
        }

        for (index, rewrite) in plan {
            let replacement = match rewrite {
                PlannedRewrite::Class(name) => Constant::Class {
                    name_index: pool.add_utf8(&name)?,
                },
                PlannedRewrite::Member {
                    kind,
                    class_index,
                    name,
                    descriptor,
                } => {
                    let name_and_type_index = pool.add_name_and_type(&name, &descriptor)?;
                    match kind {
                        RefKind::Field => Constant::FieldRef {
                            class_index,
                            name_and_type_index,
                        },
                        RefKind::Method => Constant::MethodRef {
                            class_index,
                            name_and_type_index,
                        },
                        RefKind::InterfaceMethod => Constant::InterfaceMethodRef {
                            class_index,
                            name_and_type_index,
                        },
                    }
                }
                PlannedRewrite::MethodType(descriptor) => Constant::MethodType {
                    descriptor_index: pool.add_utf8(&descriptor)?,
                },
                PlannedRewrite::Dynamic {
                    invoke,
                    bootstrap_method_attr_index,
                    name,
                    descriptor,
                } => {
                    let name_and_type_index = pool.add_name_and_type(&name, &descriptor)?;
                    if invoke {
                        Constant::InvokeDynamic {
                            bootstrap_method_attr_index,
                            name_and_type_index,
                        }
                    } else {
                        Constant::Dynamic {
                            bootstrap_method_attr_index,
                            name_and_type_index,
                        }
                    }
                }
            };
            pool.replace(index, replacement)?;
        }
        Ok(())
    }
}

impl<V: ClassVisitor> ClassVisitor for RemapStage<V> {
    fn visit_header(&mut self, pool: &mut ConstantPool, header: ClassHeader) -> Result<()> {
        self.owner = pool.class_name(header.this_class)?.to_string();
        self.next.visit_header(pool, header)
    }

    fn visit_field(&mut self, pool: &mut ConstantPool, mut field: MemberInfo) -> Result<()> {
        self.remap_member(pool, &mut field, MemberKind::Field)?;
        self.next.visit_field(pool, field)
    }

    fn visit_method(&mut self, pool: &mut ConstantPool, mut method: MemberInfo) -> Result<()> {
        self.remap_member(pool, &mut method, MemberKind::Method)?;
        self.next.visit_method(pool, method)
    }

    fn visit_attribute(&mut self, pool: &mut ConstantPool, mut attribute: Attribute) -> Result<()> {
        if attribute.is(pool, names::INNER_CLASSES) {
            self.remap_inner_classes(pool, &mut attribute)?;
        } else if attribute.is(pool, names::ENCLOSING_METHOD) {
            self.remap_enclosing_method(pool, &mut attribute)?;
        } else {
            self.remap_common_attribute(pool, &mut attribute)?;
        }
        self.next.visit_attribute(pool, attribute)
    }

    fn visit_end(&mut self, pool: &mut ConstantPool) -> Result<()> {
        self.remap_pool(pool)?;
        self.next.visit_end(pool)
    }
}
