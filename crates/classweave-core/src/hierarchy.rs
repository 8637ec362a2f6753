//! # Inheritance Index
//!
//! Resolves which class in a hierarchy actually declares a member, so member
//! mappings (keyed by the declaring class) apply to references made through
//! subclasses and implementors.
//!
//! ## Resolution order
//!
//! | Member | Order |
//! |--------|-------|
//! | field  | the class, its superinterfaces (recursively), then its superclass (recursively) |
//! | method | the class and its superclasses, then superinterfaces of each of them |
//!
//! The index is filled once from the input and classpath archives, then
//! shared read-only. Resolutions are memoized behind a `parking_lot::RwLock`
//! so concurrent lookups do not repeat hierarchy walks.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::debug;

use classweave_archive::read_archive;
use classweave_classfile::{access, ClassFile};

// =============================================================================
// Class nodes
// =============================================================================

/// The hierarchy-relevant part of one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNode {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub access_flags: u16,
    fields: HashSet<(String, String)>,
    /// `(name, descriptor)` to access flags.
    methods: HashMap<(String, String), u16>,
}

impl ClassNode {
    pub fn new(name: &str, super_name: Option<&str>, interfaces: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            super_name: super_name.map(str::to_string),
            interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
            access_flags: access::ACC_PUBLIC,
            fields: HashSet::new(),
            methods: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.insert((name.to_string(), descriptor.to_string()));
        self
    }

    pub fn with_method(self, name: &str, descriptor: &str) -> Self {
        self.with_method_access(name, descriptor, access::ACC_PUBLIC)
    }

    pub fn with_method_access(mut self, name: &str, descriptor: &str, access_flags: u16) -> Self {
        self.methods
            .insert((name.to_string(), descriptor.to_string()), access_flags);
        self
    }

    pub fn from_class(class: &ClassFile) -> Result<Self> {
        let pool = &class.pool;
        let mut fields = HashSet::new();
        for f in &class.fields {
            fields.insert((f.name(pool)?.to_string(), f.descriptor(pool)?.to_string()));
        }
        let mut methods = HashMap::new();
        for m in &class.methods {
            methods.insert(
                (m.name(pool)?.to_string(), m.descriptor(pool)?.to_string()),
                m.access_flags,
            );
        }
        Ok(Self {
            name: class.name()?.to_string(),
            super_name: class.super_name()?.map(str::to_string),
            interfaces: class
                .interface_names()?
                .into_iter()
                .map(str::to_string)
                .collect(),
            access_flags: class.access_flags,
            fields,
            methods,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_class(&ClassFile::parse(bytes)?)
    }

    pub fn declares_field(&self, name: &str, descriptor: &str) -> bool {
        self.fields
            .iter()
            .any(|(n, d)| n == name && d == descriptor)
    }

    pub fn declares_method(&self, name: &str, descriptor: &str) -> bool {
        self.method_access(name, descriptor).is_some()
    }

    pub fn method_access(&self, name: &str, descriptor: &str) -> Option<u16> {
        self.methods
            .iter()
            .find(|((n, d), _)| n == name && d == descriptor)
            .map(|(_, flags)| *flags)
    }

    /// Whether the declared method takes part in virtual dispatch, so that
    /// subclasses and implementors can override it.
    pub fn declares_virtual_method(&self, name: &str, descriptor: &str) -> bool {
        self.method_access(name, descriptor)
            .is_some_and(|flags| flags & (access::ACC_PRIVATE | access::ACC_STATIC) == 0)
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & access::ACC_INTERFACE != 0
    }
}

// =============================================================================
// Index
// =============================================================================

type ResolutionKey = (String, String, String);

#[derive(Debug, Default)]
pub struct InheritanceIndex {
    classes: HashMap<String, ClassNode>,
    field_memo: RwLock<HashMap<ResolutionKey, Option<String>>>,
    method_memo: RwLock<HashMap<ResolutionKey, Option<String>>>,
}

impl InheritanceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class; the first definition of a name wins, as on a classpath.
    pub fn insert(&mut self, node: ClassNode) -> bool {
        if self.classes.contains_key(&node.name) {
            return false;
        }
        self.classes.insert(node.name.clone(), node);
        self.field_memo.get_mut().clear();
        self.method_memo.get_mut().clear();
        true
    }

    pub fn add_class_bytes(&mut self, bytes: &[u8]) -> Result<bool> {
        Ok(self.insert(ClassNode::from_bytes(bytes)?))
    }

    /// Indexes every class entry of an archive. Returns the number added.
    pub fn add_archive(&mut self, path: &Path) -> Result<usize> {
        let mut added = 0;
        for entry in read_archive(path)? {
            if entry.class_name().is_none() {
                continue;
            }
            let node = ClassNode::from_bytes(&entry.data)
                .with_context(|| format!("Failed to index {} in {}", entry.name, path.display()))?;
            if self.insert(node) {
                added += 1;
            }
        }
        debug!("Indexed {} classes from {}", added, path.display());
        Ok(added)
    }

    /// Adds every class of `base` this index does not already hold.
    pub fn layer(&mut self, base: &InheritanceIndex) -> usize {
        let before = self.classes.len();
        for (name, node) in &base.classes {
            if !self.classes.contains_key(name) {
                self.classes.insert(name.clone(), node.clone());
            }
        }
        self.field_memo.get_mut().clear();
        self.method_memo.get_mut().clear();
        self.classes.len() - before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ClassNode> {
        self.classes.get(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Every supertype of `owner`, nearest first: the superclass chain, then
    /// the interfaces of each class in it, breadth first. Names missing from
    /// the index are listed but not expanded.
    pub fn supertypes(&self, owner: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::from([owner]);
        let mut chain: Vec<&ClassNode> = Vec::new();
        let mut current = self.classes.get(owner);
        while let Some(node) = current {
            chain.push(node);
            current = match node.super_name.as_deref() {
                Some(sup) if seen.insert(sup) => {
                    out.push(sup.to_string());
                    self.classes.get(sup)
                }
                _ => None,
            };
        }

        let mut queue: VecDeque<&str> = chain
            .iter()
            .flat_map(|n| n.interfaces.iter().map(String::as_str))
            .collect();
        while let Some(itf) = queue.pop_front() {
            if !seen.insert(itf) {
                continue;
            }
            out.push(itf.to_string());
            if let Some(node) = self.classes.get(itf) {
                queue.extend(node.interfaces.iter().map(String::as_str));
            }
        }
        out
    }

    /// Declaring class of field `name:descriptor` as seen from `owner`.
    pub fn resolve_field_owner(&self, owner: &str, name: &str, descriptor: &str) -> Option<String> {
        let key = (owner.to_string(), name.to_string(), descriptor.to_string());
        if let Some(hit) = self.field_memo.read().get(&key) {
            return hit.clone();
        }
        let mut visited = HashSet::new();
        let found = self
            .find_field(owner, name, descriptor, &mut visited)
            .map(str::to_string);
        self.field_memo.write().insert(key, found.clone());
        found
    }

    fn find_field<'a>(
        &'a self,
        owner: &'a str,
        name: &str,
        descriptor: &str,
        visited: &mut HashSet<&'a str>,
    ) -> Option<&'a str> {
        if !visited.insert(owner) {
            return None;
        }
        let node = self.classes.get(owner)?;
        if node.declares_field(name, descriptor) {
            return Some(node.name.as_str());
        }
        for itf in &node.interfaces {
            if let Some(found) = self.find_field(itf, name, descriptor, visited) {
                return Some(found);
            }
        }
        match &node.super_name {
            Some(sup) => self.find_field(sup, name, descriptor, visited),
            None => None,
        }
    }

    /// Declaring class of method `name:descriptor` as seen from `owner`.
    pub fn resolve_method_owner(&self, owner: &str, name: &str, descriptor: &str) -> Option<String> {
        let key = (owner.to_string(), name.to_string(), descriptor.to_string());
        if let Some(hit) = self.method_memo.read().get(&key) {
            return hit.clone();
        }
        let found = self.find_method(owner, name, descriptor).map(str::to_string);
        self.method_memo.write().insert(key, found.clone());
        found
    }

    fn find_method<'a>(&'a self, owner: &'a str, name: &str, descriptor: &str) -> Option<&'a str> {
        let mut chain: Vec<&ClassNode> = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(owner);
        while let Some(class_name) = current {
            if !seen.insert(class_name) {
                break;
            }
            let Some(node) = self.classes.get(class_name) else {
                break;
            };
            if node.declares_method(name, descriptor) {
                return Some(node.name.as_str());
            }
            chain.push(node);
            current = node.super_name.as_deref();
        }

        let mut queue: VecDeque<&str> = chain
            .iter()
            .flat_map(|n| n.interfaces.iter().map(String::as_str))
            .collect();
        let mut seen_itf = HashSet::new();
        while let Some(itf) = queue.pop_front() {
            if !seen_itf.insert(itf) {
                continue;
            }
            let Some(node) = self.classes.get(itf) else {
                continue;
            };
            if node.declares_method(name, descriptor) {
                return Some(node.name.as_str());
            }
            queue.extend(node.interfaces.iter().map(String::as_str));
        }
        None
    }
}
