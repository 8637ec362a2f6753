//! Reference analysis stage.
//!
//! Records every type a class structurally depends on: its own name, its
//! superclass, its interfaces and the object types in field and method
//! descriptors. One analyzer sits before the injector and one after it; the
//! names only the second one saw are the candidates for stub synthesis.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;

use classweave_classfile::descriptor::descriptor_classes;
use classweave_classfile::{Attribute, ClassHeader, ClassVisitor, ConstantPool, MemberInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceRole {
    /// The class being visited.
    Declared,
    Superclass,
    Interface,
    /// Field, parameter or return type.
    Type,
}

impl ReferenceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceRole::Declared => "declared",
            ReferenceRole::Superclass => "superclass",
            ReferenceRole::Interface => "interface",
            ReferenceRole::Type => "type",
        }
    }
}

/// Referenced type names with every role each was seen in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    refs: BTreeMap<String, BTreeSet<ReferenceRole>>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, role: ReferenceRole) {
        self.refs.entry(name.to_string()).or_default().insert(role);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.refs.contains_key(name)
    }

    pub fn roles(&self, name: &str) -> Option<&BTreeSet<ReferenceRole>> {
        self.refs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<ReferenceRole>)> {
        self.refs.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.refs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Names present here but absent from `earlier`, with their roles here.
    pub fn difference(&self, earlier: &ReferenceSet) -> ReferenceSet {
        ReferenceSet {
            refs: self
                .refs
                .iter()
                .filter(|(name, _)| !earlier.contains(name))
                .map(|(n, r)| (n.clone(), r.clone()))
                .collect(),
        }
    }

    /// Unions names and roles.
    pub fn merge(&mut self, other: &ReferenceSet) {
        for (name, roles) in &other.refs {
            self.refs
                .entry(name.clone())
                .or_default()
                .extend(roles.iter().copied());
        }
    }

    /// Drops names under any of the given package prefixes.
    pub fn without_prefixes(&self, prefixes: &[String]) -> ReferenceSet {
        ReferenceSet {
            refs: self
                .refs
                .iter()
                .filter(|(name, _)| !prefixes.iter().any(|p| name.starts_with(p.as_str())))
                .map(|(n, r)| (n.clone(), r.clone()))
                .collect(),
        }
    }
}

pub struct ReferenceAnalyzer<V> {
    next: V,
    refs: ReferenceSet,
}

impl<V> ReferenceAnalyzer<V> {
    pub fn new(next: V) -> Self {
        Self {
            next,
            refs: ReferenceSet::new(),
        }
    }

    pub fn references(&self) -> &ReferenceSet {
        &self.refs
    }

    pub fn into_parts(self) -> (ReferenceSet, V) {
        (self.refs, self.next)
    }

    fn record_descriptor(&mut self, descriptor: &str) {
        for name in descriptor_classes(descriptor) {
            self.refs.record(&name, ReferenceRole::Type);
        }
    }
}

impl<V: ClassVisitor> ClassVisitor for ReferenceAnalyzer<V> {
    fn visit_header(&mut self, pool: &mut ConstantPool, header: ClassHeader) -> Result<()> {
        self.refs
            .record(pool.class_name(header.this_class)?, ReferenceRole::Declared);
        if header.super_class != 0 {
            self.refs
                .record(pool.class_name(header.super_class)?, ReferenceRole::Superclass);
        }
        for itf in &header.interfaces {
            self.refs.record(pool.class_name(*itf)?, ReferenceRole::Interface);
        }
        self.next.visit_header(pool, header)
    }

    fn visit_field(&mut self, pool: &mut ConstantPool, field: MemberInfo) -> Result<()> {
        self.record_descriptor(field.descriptor(pool)?);
        self.next.visit_field(pool, field)
    }

    fn visit_method(&mut self, pool: &mut ConstantPool, method: MemberInfo) -> Result<()> {
        self.record_descriptor(method.descriptor(pool)?);
        self.next.visit_method(pool, method)
    }

    fn visit_attribute(&mut self, pool: &mut ConstantPool, attribute: Attribute) -> Result<()> {
        self.next.visit_attribute(pool, attribute)
    }

    fn visit_end(&mut self, pool: &mut ConstantPool) -> Result<()> {
        self.next.visit_end(pool)
    }
}
