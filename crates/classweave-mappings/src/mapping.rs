//! A partial renaming from one symbol namespace to another.
//!
//! Member entries are keyed by `(owner, name, descriptor)` where owner and
//! descriptor are expressed in the source namespace. Lookups never allocate.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};

use classweave_classfile::descriptor::map_descriptor_classes;

/// Fully qualified member identity in some namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberKey {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberKey {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

/// owner -> name -> descriptor -> target name
#[derive(Debug, Clone, Default)]
struct MemberTable {
    entries: HashMap<String, HashMap<String, HashMap<String, String>>>,
    len: usize,
}

impl MemberTable {
    fn insert(&mut self, owner: &str, name: &str, descriptor: &str, target: &str) {
        let previous = self
            .entries
            .entry(owner.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default()
            .insert(descriptor.to_string(), target.to_string());
        if previous.is_none() {
            self.len += 1;
        }
    }

    fn get(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.entries
            .get(owner)?
            .get(name)?
            .get(descriptor)
            .map(String::as_str)
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &str, &str, &str)> {
        self.entries.iter().flat_map(|(owner, names)| {
            names.iter().flat_map(move |(name, descs)| {
                descs
                    .iter()
                    .map(move |(desc, target)| (owner.as_str(), name.as_str(), desc.as_str(), target.as_str()))
            })
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Mapping {
    source: String,
    target: String,
    classes: HashMap<String, String>,
    fields: MemberTable,
    methods: MemberTable,
}

impl Mapping {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            ..Default::default()
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn add_class(&mut self, from: &str, to: &str) {
        self.classes.insert(from.to_string(), to.to_string());
    }

    pub fn add_field(&mut self, owner: &str, name: &str, descriptor: &str, to: &str) {
        self.fields.insert(owner, name, descriptor, to);
    }

    pub fn add_method(&mut self, owner: &str, name: &str, descriptor: &str, to: &str) {
        self.methods.insert(owner, name, descriptor, to);
    }

    pub fn class_name(&self, name: &str) -> Option<&str> {
        self.classes.get(name).map(String::as_str)
    }

    pub fn field_name(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.fields.get(owner, name, descriptor)
    }

    pub fn method_name(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.methods.get(owner, name, descriptor)
    }

    /// Class name in the target namespace, identity when unmapped.
    pub fn map_class(&self, name: &str) -> String {
        self.class_name(name).unwrap_or(name).to_string()
    }

    pub fn map_descriptor(&self, descriptor: &str) -> String {
        map_descriptor_classes(descriptor, |name| self.map_class(name))
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len
    }

    pub fn method_count(&self) -> usize {
        self.methods.len
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.fields.len == 0 && self.methods.len == 0
    }

    /// Composes `self: A -> B` with `next: B -> C` into `A -> C`.
    ///
    /// Entries only `next` knows about are carried over when their `B` name
    /// is also their `A` name, i.e. `self` leaves them untouched.
    pub fn compose(&self, next: &Mapping) -> Result<Mapping> {
        if self.target != next.source {
            bail!(
                "cannot compose {} -> {} with {} -> {}",
                self.source,
                self.target,
                next.source,
                next.target
            );
        }
        let mut out = Mapping::new(&self.source, &next.target);

        let renamed_targets: HashSet<&str> = self.classes.values().map(String::as_str).collect();
        let inverse: HashMap<&str, &str> = self
            .classes
            .iter()
            .map(|(a, b)| (b.as_str(), a.as_str()))
            .collect();
        // B-namespace class name -> A-namespace name, if one exists
        let to_source = |b: &str| -> Option<String> {
            if let Some(a) = inverse.get(b) {
                Some(a.to_string())
            } else if self.classes.contains_key(b) {
                None
            } else {
                Some(b.to_string())
            }
        };

        for (a, b) in &self.classes {
            out.add_class(a, &next.map_class(b));
        }
        for (b, c) in &next.classes {
            if !self.classes.contains_key(b.as_str()) && !renamed_targets.contains(b.as_str()) {
                out.add_class(b, c);
            }
        }

        for (table, next_table, out_is_field) in [
            (&self.fields, &next.fields, true),
            (&self.methods, &next.methods, false),
        ] {
            let mut composed = MemberTable::default();
            let mut images = MemberTable::default();
            for (owner, name, desc, b_name) in table.iter() {
                let b_owner = self.map_class(owner);
                let b_desc = self.map_descriptor(desc);
                let c_name = next_table.get(&b_owner, b_name, &b_desc).unwrap_or(b_name);
                composed.insert(owner, name, desc, c_name);
                images.insert(&b_owner, b_name, &b_desc, c_name);
            }
            for (b_owner, b_name, b_desc, c_name) in next_table.iter() {
                if images.get(b_owner, b_name, b_desc).is_some() {
                    continue;
                }
                let Some(a_owner) = to_source(b_owner) else {
                    continue;
                };
                let mut unmappable = false;
                let a_desc = map_descriptor_classes(b_desc, |n| match to_source(n) {
                    Some(a) => a,
                    None => {
                        unmappable = true;
                        n.to_string()
                    }
                });
                if unmappable
                    || table.get(&a_owner, b_name, &a_desc).is_some()
                    || composed.get(&a_owner, b_name, &a_desc).is_some()
                {
                    continue;
                }
                composed.insert(&a_owner, b_name, &a_desc, c_name);
            }
            if out_is_field {
                out.fields = composed;
            } else {
                out.methods = composed;
            }
        }

        Ok(out)
    }

    /// Swaps source and target.
    pub fn invert(&self) -> Mapping {
        let mut out = Mapping::new(&self.target, &self.source);
        for (a, b) in &self.classes {
            out.add_class(b, a);
        }
        for (owner, name, desc, to) in self.fields.iter() {
            out.add_field(&self.map_class(owner), to, &self.map_descriptor(desc), name);
        }
        for (owner, name, desc, to) in self.methods.iter() {
            out.add_method(&self.map_class(owner), to, &self.map_descriptor(desc), name);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn official_to_intermediary() -> Mapping {
        let mut m = Mapping::new("official", "intermediary");
        m.add_class("a", "net/minecraft/class_1");
        m.add_class("b", "net/minecraft/class_2");
        m.add_field("a", "c", "Lb;", "field_1");
        m.add_method("a", "d", "(Lb;)V", "method_1");
        m
    }

    fn intermediary_to_named() -> Mapping {
        let mut m = Mapping::new("intermediary", "named");
        m.add_class("net/minecraft/class_1", "net/minecraft/Foo");
        m.add_class("net/minecraft/class_2", "net/minecraft/Bar");
        m.add_field("net/minecraft/class_1", "field_1", "Lnet/minecraft/class_2;", "bar");
        m.add_method("net/minecraft/class_1", "method_1", "(Lnet/minecraft/class_2;)V", "tick");
        m.add_class("net/minecraft/Unobfuscated", "net/minecraft/Nice");
        m
    }

    #[test]
    fn test_lookup_and_identity_fallback() {
        let m = official_to_intermediary();
        assert_eq!(m.map_class("a"), "net/minecraft/class_1");
        assert_eq!(m.map_class("java/lang/Object"), "java/lang/Object");
        assert_eq!(m.field_name("a", "c", "Lb;"), Some("field_1"));
        assert_eq!(m.field_name("a", "c", "I"), None);
        assert_eq!(m.map_descriptor("(La;I)Lb;"), "(Lnet/minecraft/class_1;I)Lnet/minecraft/class_2;");
    }

    #[test]
    fn test_compose_chains_names() {
        let composed = official_to_intermediary()
            .compose(&intermediary_to_named())
            .unwrap();
        assert_eq!(composed.source(), "official");
        assert_eq!(composed.target(), "named");
        assert_eq!(composed.class_name("a"), Some("net/minecraft/Foo"));
        assert_eq!(composed.field_name("a", "c", "Lb;"), Some("bar"));
        assert_eq!(composed.method_name("a", "d", "(Lb;)V"), Some("tick"));
        // only known to the second mapping, same name in both namespaces
        assert_eq!(
            composed.class_name("net/minecraft/Unobfuscated"),
            Some("net/minecraft/Nice")
        );
    }

    #[test]
    fn test_compose_rejects_namespace_mismatch() {
        let m = official_to_intermediary();
        assert!(m.compose(&official_to_intermediary()).is_err());
    }

    #[test]
    fn test_invert() {
        let inv = official_to_intermediary().invert();
        assert_eq!(inv.class_name("net/minecraft/class_1"), Some("a"));
        assert_eq!(
            inv.field_name("net/minecraft/class_1", "field_1", "Lnet/minecraft/class_2;"),
            Some("c")
        );
    }
}
