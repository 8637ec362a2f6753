//! Declarative definitions of the synthetic members to inject.
//!
//! Definitions are read from JSON:
//!
//! ```json
//! {
//!   "classes": [
//!     {
//!       "name": "net/minecraft/Foo",
//!       "interfaces": ["com/example/Tickable"],
//!       "members": [
//!         { "name": "bar", "descriptor": "I" },
//!         { "name": "baz", "descriptor": "Ljava/lang/String;", "static": true },
//!         { "name": "getAge", "descriptor": "I", "accessor": { "kind": "getter", "target": "age" } }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! The set has a canonical text form (classes sorted by name, members in
//! declared order) which is what the content hash covers.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use classweave_classfile::{FieldType, MethodDescriptor};

use crate::cache::{compute_hash, ContentHash};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessorKind {
    /// New storage plus a `get<Name>` / `set<Name>` pair.
    #[default]
    Field,
    /// Method `name` returning existing field `target`.
    Getter { target: String },
    /// Method `name` assigning existing field `target`.
    Setter { target: String },
    /// Method `name` forwarding to existing method `target`.
    Passthrough { target: String },
}

impl AccessorKind {
    pub fn label(&self) -> &'static str {
        match self {
            AccessorKind::Field => "field",
            AccessorKind::Getter { .. } => "getter",
            AccessorKind::Setter { .. } => "setter",
            AccessorKind::Passthrough { .. } => "passthrough",
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            AccessorKind::Field => None,
            AccessorKind::Getter { target }
            | AccessorKind::Setter { target }
            | AccessorKind::Passthrough { target } => Some(target),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyntheticMember {
    pub name: String,
    /// Field descriptor, or the method descriptor for `Passthrough`.
    pub descriptor: String,
    #[serde(rename = "static", default)]
    pub is_static: bool,
    #[serde(default)]
    pub accessor: AccessorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorRole {
    Get,
    Set,
    Invoke,
}

/// A method generated for a synthetic member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessorMethod {
    pub name: String,
    pub descriptor: String,
    pub role: AccessorRole,
    pub is_static: bool,
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl SyntheticMember {
    pub fn field(name: &str, descriptor: &str, is_static: bool) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_static,
            accessor: AccessorKind::Field,
        }
    }

    pub fn with_accessor(name: &str, descriptor: &str, is_static: bool, accessor: AccessorKind) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_static,
            accessor,
        }
    }

    pub fn is_field(&self) -> bool {
        self.accessor == AccessorKind::Field
    }

    pub fn getter_name(&self) -> String {
        format!("get{}", capitalize(&self.name))
    }

    pub fn setter_name(&self) -> String {
        format!("set{}", capitalize(&self.name))
    }

    pub fn getter_descriptor(&self) -> String {
        format!("(){}", self.descriptor)
    }

    pub fn setter_descriptor(&self) -> String {
        format!("({})V", self.descriptor)
    }

    /// Methods this member adds to its class.
    pub fn accessor_methods(&self) -> Vec<AccessorMethod> {
        let method = |name: String, descriptor: String, role| AccessorMethod {
            name,
            descriptor,
            role,
            is_static: self.is_static,
        };
        match &self.accessor {
            AccessorKind::Field => vec![
                method(self.getter_name(), self.getter_descriptor(), AccessorRole::Get),
                method(self.setter_name(), self.setter_descriptor(), AccessorRole::Set),
            ],
            AccessorKind::Getter { .. } => vec![method(
                self.name.clone(),
                self.getter_descriptor(),
                AccessorRole::Get,
            )],
            AccessorKind::Setter { .. } => vec![method(
                self.name.clone(),
                self.setter_descriptor(),
                AccessorRole::Set,
            )],
            AccessorKind::Passthrough { .. } => vec![method(
                self.name.clone(),
                self.descriptor.clone(),
                AccessorRole::Invoke,
            )],
        }
    }

    pub fn field_type(&self) -> Result<FieldType> {
        FieldType::parse(&self.descriptor)
    }

    fn validate(&self, owner: &str) -> Result<()> {
        let bad_name = |n: &str| n.is_empty() || n.contains(['.', ';', '[', '/', '<', '>']);
        if bad_name(&self.name) {
            bail!("{}: invalid member name {:?}", owner, self.name);
        }
        match &self.accessor {
            AccessorKind::Passthrough { .. } => {
                MethodDescriptor::parse(&self.descriptor)
                    .with_context(|| format!("{}.{}: bad method descriptor", owner, self.name))?;
            }
            _ => {
                FieldType::parse(&self.descriptor)
                    .with_context(|| format!("{}.{}: bad field descriptor", owner, self.name))?;
            }
        }
        if let Some(target) = self.accessor.target() {
            if bad_name(target) {
                bail!("{}.{}: invalid target name {:?}", owner, self.name, target);
            }
        }
        Ok(())
    }

    fn canonical_line(&self, out: &mut String) {
        let scope = if self.is_static { "static" } else { "instance" };
        let _ = write!(
            out,
            "  {} {} {} {}",
            self.accessor.label(),
            scope,
            self.name,
            self.descriptor
        );
        if let Some(target) = self.accessor.target() {
            let _ = write!(out, " {}", target);
        }
        out.push('\n');
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDefinition {
    /// Internal name (`a/b/C`); dotted names are normalized on load.
    pub name: String,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub members: Vec<SyntheticMember>,
}

impl ClassDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.replace('.', "/"),
            interfaces: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn with_member(mut self, member: SyntheticMember) -> Self {
        self.members.push(member);
        self
    }

    pub fn with_interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.replace('.', "/"));
        self
    }

    fn normalize(&mut self) {
        self.name = self.name.replace('.', "/");
        for itf in &mut self.interfaces {
            *itf = itf.replace('.', "/");
        }
        let mut seen = HashSet::new();
        self.interfaces.retain(|i| seen.insert(i.clone()));
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("class definition with an empty name");
        }
        let mut methods = HashSet::new();
        let mut fields = HashSet::new();
        for member in &self.members {
            member.validate(&self.name)?;
            if member.is_field() && !fields.insert(member.name.as_str()) {
                bail!("{}: synthetic field {} declared twice", self.name, member.name);
            }
            for m in member.accessor_methods() {
                if !methods.insert((m.name.clone(), m.descriptor.clone())) {
                    bail!(
                        "{}: accessor {}{} generated by more than one member",
                        self.name,
                        m.name,
                        m.descriptor
                    );
                }
            }
        }
        Ok(())
    }

    pub fn has_members(&self) -> bool {
        !self.members.is_empty()
    }

    /// The member whose generated accessor is `name` + `descriptor`.
    pub fn find_accessor(&self, name: &str, descriptor: &str) -> Option<(&SyntheticMember, AccessorMethod)> {
        self.members.iter().find_map(|member| {
            member
                .accessor_methods()
                .into_iter()
                .find(|m| m.name == name && m.descriptor == descriptor)
                .map(|m| (member, m))
        })
    }

    /// The `Field` member storing `name` with `descriptor`.
    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&SyntheticMember> {
        self.members
            .iter()
            .find(|m| m.is_field() && m.name == name && m.descriptor == descriptor)
    }

    pub fn instance_fields(&self) -> impl Iterator<Item = &SyntheticMember> {
        self.members.iter().filter(|m| m.is_field() && !m.is_static)
    }

    pub fn static_fields(&self) -> impl Iterator<Item = &SyntheticMember> {
        self.members.iter().filter(|m| m.is_field() && m.is_static)
    }

    /// Getter, setter and passthrough members.
    pub fn targeted_members(&self) -> impl Iterator<Item = &SyntheticMember> {
        self.members.iter().filter(|m| !m.is_field())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DefinitionFile {
    #[serde(default)]
    classes: Vec<ClassDefinition>,
}

/// All class definitions for one build. Immutable once constructed; the
/// digest is computed at construction.
#[derive(Debug, Clone)]
pub struct DefinitionSet {
    classes: BTreeMap<String, ClassDefinition>,
    digest: ContentHash,
}

impl DefinitionSet {
    pub fn new(classes: Vec<ClassDefinition>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for mut class in classes {
            class.normalize();
            class.validate()?;
            if map.contains_key(&class.name) {
                bail!("class {} defined more than once", class.name);
            }
            map.insert(class.name.clone(), class);
        }
        let mut set = Self {
            classes: map,
            digest: ContentHash::default(),
        };
        set.digest = compute_hash(&set);
        Ok(set)
    }

    pub fn empty() -> Self {
        let mut set = Self {
            classes: BTreeMap::new(),
            digest: ContentHash::default(),
        };
        set.digest = compute_hash(&set);
        set
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let file: DefinitionFile =
            serde_json::from_str(text).context("Failed to parse definitions JSON")?;
        Self::new(file.classes)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read definitions {}: {}", path.display(), e))?;
        Self::from_json(&text).with_context(|| format!("Invalid definitions in {}", path.display()))
    }

    pub fn to_json(&self) -> Result<String> {
        let file = DefinitionFile {
            classes: self.classes.values().cloned().collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn get(&self, name: &str) -> Option<&ClassDefinition> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDefinition> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn digest(&self) -> ContentHash {
        self.digest
    }

    /// Deterministic text form: classes by name, interfaces and members in
    /// declared order.
    pub fn canonical(&self) -> String {
        let mut out = String::from("classweave-definitions v1\n");
        for class in self.classes.values() {
            let _ = writeln!(out, "class {}", class.name);
            for itf in &class.interfaces {
                let _ = writeln!(out, "  interface {}", itf);
            }
            for member in &class.members {
                member.canonical_line(&mut out);
            }
        }
        out
    }

    /// Combines two sets into a new one with a freshly computed digest.
    /// Definitions of the same class are joined; identical members are kept once.
    pub fn merge(&self, other: &DefinitionSet) -> Result<DefinitionSet> {
        let mut merged: BTreeMap<String, ClassDefinition> = self.classes.clone();
        for class in other.classes.values() {
            match merged.get_mut(&class.name) {
                Some(existing) => {
                    for itf in &class.interfaces {
                        if !existing.interfaces.contains(itf) {
                            existing.interfaces.push(itf.clone());
                        }
                    }
                    for member in &class.members {
                        if !existing.members.contains(member) {
                            existing.members.push(member.clone());
                        }
                    }
                }
                None => {
                    merged.insert(class.name.clone(), class.clone());
                }
            }
        }
        Self::new(merged.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "classes": [
            {
                "name": "net.minecraft.Foo",
                "members": [
                    { "name": "bar", "descriptor": "I" },
                    { "name": "baz", "descriptor": "Ljava/lang/String;", "static": true },
                    { "name": "readAge", "descriptor": "I", "accessor": { "kind": "getter", "target": "age" } }
                ]
            },
            { "name": "net/minecraft/Bar", "interfaces": ["com.example.Marker"] }
        ]
    }"#;

    #[test]
    fn test_load_normalizes_names() {
        let set = DefinitionSet::from_json(JSON).unwrap();
        assert_eq!(set.len(), 2);
        let foo = set.get("net/minecraft/Foo").unwrap();
        assert_eq!(foo.members.len(), 3);
        assert!(foo.members[1].is_static);
        assert_eq!(
            foo.members[2].accessor,
            AccessorKind::Getter {
                target: "age".into()
            }
        );
        let bar = set.get("net/minecraft/Bar").unwrap();
        assert_eq!(bar.interfaces, vec!["com/example/Marker"]);
    }

    #[test]
    fn test_accessor_names() {
        let m = SyntheticMember::field("bar", "I", false);
        let methods = m.accessor_methods();
        assert_eq!(methods[0].name, "getBar");
        assert_eq!(methods[0].descriptor, "()I");
        assert_eq!(methods[1].name, "setBar");
        assert_eq!(methods[1].descriptor, "(I)V");
    }

    #[test]
    fn test_find_accessor_and_field() {
        let set = DefinitionSet::from_json(JSON).unwrap();
        let foo = set.get("net/minecraft/Foo").unwrap();
        let (member, method) = foo.find_accessor("setBaz", "(Ljava/lang/String;)V").unwrap();
        assert_eq!(member.name, "baz");
        assert_eq!(method.role, AccessorRole::Set);
        assert!(method.is_static);
        assert!(foo.find_field("bar", "I").is_some());
        assert!(foo.find_field("readAge", "I").is_none());
    }

    #[test]
    fn test_canonical_is_order_independent_for_classes() {
        let a = DefinitionSet::new(vec![
            ClassDefinition::new("b/B").with_member(SyntheticMember::field("x", "I", false)),
            ClassDefinition::new("a/A"),
        ])
        .unwrap();
        let b = DefinitionSet::new(vec![
            ClassDefinition::new("a/A"),
            ClassDefinition::new("b/B").with_member(SyntheticMember::field("x", "I", false)),
        ])
        .unwrap();
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.digest(), b.digest());
        assert!(a.canonical().contains("class a/A\nclass b/B\n  field instance x I\n"));
    }

    #[test]
    fn test_member_order_changes_digest() {
        let a = DefinitionSet::new(vec![ClassDefinition::new("a/A")
            .with_member(SyntheticMember::field("x", "I", false))
            .with_member(SyntheticMember::field("y", "I", false))])
        .unwrap();
        let b = DefinitionSet::new(vec![ClassDefinition::new("a/A")
            .with_member(SyntheticMember::field("y", "I", false))
            .with_member(SyntheticMember::field("x", "I", false))])
        .unwrap();
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_merge_recomputes_digest() {
        let a = DefinitionSet::new(vec![
            ClassDefinition::new("a/A").with_member(SyntheticMember::field("x", "I", false))
        ])
        .unwrap();
        let b = DefinitionSet::new(vec![
            ClassDefinition::new("a/A").with_member(SyntheticMember::field("y", "J", true))
        ])
        .unwrap();
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.get("a/A").unwrap().members.len(), 2);
        assert_ne!(merged.digest(), a.digest());
        assert_eq!(merged.digest(), compute_hash(&merged));

        let again = merged.merge(&b).unwrap();
        assert_eq!(again.digest(), merged.digest());
    }

    #[test]
    fn test_validation_failures() {
        let dup = DefinitionSet::new(vec![ClassDefinition::new("a/A")
            .with_member(SyntheticMember::field("x", "I", false))
            .with_member(SyntheticMember::field("x", "J", false))]);
        assert!(dup.is_err());

        let bad_desc = DefinitionSet::new(vec![
            ClassDefinition::new("a/A").with_member(SyntheticMember::field("x", "Q", false))
        ]);
        assert!(bad_desc.is_err());

        // getter named like the generated accessor of a field
        let clash = DefinitionSet::new(vec![ClassDefinition::new("a/A")
            .with_member(SyntheticMember::field("x", "I", false))
            .with_member(SyntheticMember::with_accessor(
                "getX",
                "I",
                false,
                AccessorKind::Getter { target: "y".into() },
            ))]);
        assert!(clash.is_err());

        let twice = DefinitionSet::new(vec![ClassDefinition::new("a/A"), ClassDefinition::new("a.A")]);
        assert!(twice.is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_digest() {
        let set = DefinitionSet::from_json(JSON).unwrap();
        let again = DefinitionSet::from_json(&set.to_json().unwrap()).unwrap();
        assert_eq!(set.digest(), again.digest());
    }
}
