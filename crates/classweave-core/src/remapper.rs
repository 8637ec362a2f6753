//! # Symbol Renaming Engine
//!
//! Maps class and member names from a source namespace to a target namespace.
//! Member lookups first resolve the declaring class through the
//! [`InheritanceIndex`], then consult the mapping tables in priority order.
//!
//! Mapping tables only carry an entry for the topmost declaration of a
//! virtual method. An override that has no entry of its own takes the name
//! of the nearest mapped supertype declaration, so dispatch still reaches it
//! after renaming.
//!
//! ## Two-phase construction
//!
//! The injector needs renamed names, but the engine needs the inheritance
//! index, which only exists after the classpath has been read. Construction is
//! therefore split:
//!
//! ```text
//! RemapperBuilder::new()          mapping tables known
//!        │  .with_mapping(..)
//!        ▼
//! classpath ingestion             InheritanceIndex filled
//!        │
//!        ▼
//! builder.build(index) ──► Remapper ──► handle.bind(..)
//!                                             │
//! RemapperHandle::get() ◄─────────────────────┘
//! ```
//!
//! A [`RemapperHandle`] can be cloned and handed out before the engine
//! exists; reading through it before `bind` fails with
//! [`WeaveError::StaleReadBeforeReady`].

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, bail, Result};
use parking_lot::RwLock;
use tracing::{debug, Level};

use classweave_classfile::descriptor::map_descriptor_classes;
use classweave_classfile::signature::remap_signature;
use classweave_mappings::Mapping;

use crate::error::WeaveError;
use crate::hierarchy::InheritanceIndex;

// =============================================================================
// Remapper
// =============================================================================

type MethodKey = (String, String, String);

#[derive(Debug)]
pub struct Remapper {
    mappings: Vec<Arc<Mapping>>,
    index: Arc<InheritanceIndex>,
    /// Names inherited by overrides, keyed by declaring class.
    inherited: RwLock<HashMap<MethodKey, Option<String>>>,
}

impl Remapper {
    /// A remapper that renames nothing.
    pub fn identity(index: Arc<InheritanceIndex>) -> Self {
        Self {
            mappings: Vec::new(),
            index,
            inherited: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.mappings.iter().all(|m| m.is_empty())
    }

    pub fn index(&self) -> &InheritanceIndex {
        &self.index
    }

    pub fn map_class(&self, name: &str) -> String {
        if name.starts_with('[') {
            return self.map_descriptor(name);
        }
        self.mappings
            .iter()
            .find_map(|m| m.class_name(name))
            .unwrap_or(name)
            .to_string()
    }

    pub fn map_descriptor(&self, descriptor: &str) -> String {
        map_descriptor_classes(descriptor, |name| self.map_class(name))
    }

    pub fn map_method_descriptor(&self, descriptor: &str) -> String {
        self.map_descriptor(descriptor)
    }

    pub fn map_signature(&self, signature: &str) -> Result<String> {
        remap_signature(signature, |name| self.map_class(name))
    }

    fn unresolved(&self, owner: &str, name: &str, descriptor: &str) {
        if !tracing::enabled!(Level::DEBUG) {
            return;
        }
        let err = WeaveError::UnresolvedOwner {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        };
        debug!("{}", err);
    }

    fn mapped_method(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.mappings
            .iter()
            .find_map(|m| m.method_name(owner, name, descriptor))
    }

    /// Name of the nearest mapped supertype declaration that `declaring`'s
    /// method overrides.
    fn inherited_method_name(&self, declaring: &str, name: &str, descriptor: &str) -> Option<String> {
        let overridable = self
            .index
            .get(declaring)
            .is_some_and(|node| node.declares_virtual_method(name, descriptor));
        if !overridable {
            return None;
        }
        let key = (declaring.to_string(), name.to_string(), descriptor.to_string());
        if let Some(hit) = self.inherited.read().get(&key) {
            return hit.clone();
        }
        let found = self
            .index
            .supertypes(declaring)
            .iter()
            .filter(|sup| {
                // private or static supertype methods are not overridden
                self.index
                    .get(sup.as_str())
                    .map_or(true, |node| node.declares_virtual_method(name, descriptor))
            })
            .find_map(|sup| self.mapped_method(sup, name, descriptor))
            .map(str::to_string);
        if let Some(to) = &found {
            debug!("{}.{}{} inherits name {}", declaring, name, descriptor, to);
        }
        self.inherited.write().insert(key, found.clone());
        found
    }

    pub fn map_field_name(&self, owner: &str, name: &str, descriptor: &str) -> String {
        let Some(declaring) = self.index.resolve_field_owner(owner, name, descriptor) else {
            self.unresolved(owner, name, descriptor);
            return name.to_string();
        };
        self.mappings
            .iter()
            .find_map(|m| m.field_name(&declaring, name, descriptor))
            .unwrap_or(name)
            .to_string()
    }

    pub fn map_method_name(&self, owner: &str, name: &str, descriptor: &str) -> String {
        if name.starts_with('<') || owner.starts_with('[') {
            return name.to_string();
        }
        let Some(declaring) = self.index.resolve_method_owner(owner, name, descriptor) else {
            self.unresolved(owner, name, descriptor);
            return name.to_string();
        };
        if let Some(mapped) = self.mapped_method(&declaring, name, descriptor) {
            return mapped.to_string();
        }
        self.inherited_method_name(&declaring, name, descriptor)
            .unwrap_or_else(|| name.to_string())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Collects mapping tables before the classpath has been read.
#[derive(Debug, Default, Clone)]
pub struct RemapperBuilder {
    mappings: Vec<Arc<Mapping>>,
}

impl RemapperBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table; earlier tables take priority over later ones.
    pub fn with_mapping(mut self, mapping: Arc<Mapping>) -> Self {
        self.mappings.push(mapping);
        self
    }

    pub fn with_mappings(mut self, mappings: impl IntoIterator<Item = Arc<Mapping>>) -> Self {
        self.mappings.extend(mappings);
        self
    }

    pub fn build(self, index: Arc<InheritanceIndex>) -> Result<Remapper> {
        if let Some(first) = self.mappings.first() {
            for m in &self.mappings[1..] {
                if m.source() != first.source() || m.target() != first.target() {
                    bail!(
                        "mapping tables disagree on namespaces: {} -> {} vs {} -> {}",
                        first.source(),
                        first.target(),
                        m.source(),
                        m.target()
                    );
                }
            }
        }
        Ok(Remapper {
            mappings: self.mappings,
            index,
            inherited: RwLock::new(HashMap::new()),
        })
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Placeholder for a [`Remapper`] that is bound exactly once.
#[derive(Debug, Clone, Default)]
pub struct RemapperHandle {
    slot: Arc<OnceLock<Arc<Remapper>>>,
}

impl RemapperHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, remapper: Arc<Remapper>) -> Result<()> {
        self.slot
            .set(remapper)
            .map_err(|_| anyhow!("renaming engine is already bound"))
    }

    pub fn is_bound(&self) -> bool {
        self.slot.get().is_some()
    }

    /// The bound engine; `lookup` names what was being read, for the error.
    pub fn get(&self, lookup: &str) -> Result<Arc<Remapper>, WeaveError> {
        self.slot
            .get()
            .cloned()
            .ok_or_else(|| WeaveError::StaleReadBeforeReady {
                lookup: lookup.to_string(),
            })
    }

    pub fn map_class(&self, name: &str) -> Result<String, WeaveError> {
        Ok(self.get(name)?.map_class(name))
    }

    pub fn map_field_name(&self, owner: &str, name: &str, descriptor: &str) -> Result<String, WeaveError> {
        let remapper = self.get(&format!("field {}.{}:{}", owner, name, descriptor))?;
        Ok(remapper.map_field_name(owner, name, descriptor))
    }

    pub fn map_method_name(&self, owner: &str, name: &str, descriptor: &str) -> Result<String, WeaveError> {
        let remapper = self.get(&format!("method {}.{}{}", owner, name, descriptor))?;
        Ok(remapper.map_method_name(owner, name, descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::ClassNode;
    use classweave_classfile::access;

    fn index() -> Arc<InheritanceIndex> {
        let mut idx = InheritanceIndex::new();
        idx.insert(
            ClassNode::new("net/minecraft/class_1", Some("java/lang/Object"), &[])
                .with_field("field_1", "I")
                .with_method("method_1", "(Lnet/minecraft/class_1;)V"),
        );
        idx.insert(ClassNode::new("net/minecraft/class_2", Some("net/minecraft/class_1"), &[]));
        Arc::new(idx)
    }

    fn mapping() -> Arc<Mapping> {
        let mut m = Mapping::new("intermediary", "named");
        m.add_class("net/minecraft/class_1", "net/minecraft/Entity");
        m.add_class("net/minecraft/class_2", "net/minecraft/Zombie");
        m.add_field("net/minecraft/class_1", "field_1", "I", "age");
        m.add_method("net/minecraft/class_1", "method_1", "(Lnet/minecraft/class_1;)V", "copyFrom");
        Arc::new(m)
    }

    #[test]
    fn test_member_names_resolve_through_hierarchy() {
        let r = RemapperBuilder::new().with_mapping(mapping()).build(index()).unwrap();
        assert_eq!(r.map_field_name("net/minecraft/class_2", "field_1", "I"), "age");
        assert_eq!(
            r.map_method_name("net/minecraft/class_2", "method_1", "(Lnet/minecraft/class_1;)V"),
            "copyFrom"
        );
        assert_eq!(
            r.map_descriptor("(Lnet/minecraft/class_2;[Lnet/minecraft/class_1;)V"),
            "(Lnet/minecraft/Zombie;[Lnet/minecraft/Entity;)V"
        );
        assert_eq!(r.map_class("[Lnet/minecraft/class_1;"), "[Lnet/minecraft/Entity;");
    }

    fn override_index() -> Arc<InheritanceIndex> {
        let mut idx = InheritanceIndex::new();
        idx.insert(ClassNode::new("a/Base", Some("java/lang/Object"), &[]).with_method("method_1", "()V"));
        idx.insert(ClassNode::new("a/Sub", Some("a/Base"), &[]).with_method("method_1", "()V"));
        idx.insert(ClassNode::new("a/Leaf", Some("a/Sub"), &[]).with_method("method_1", "()V"));
        idx.insert(
            ClassNode::new("a/Hidden", Some("java/lang/Object"), &[])
                .with_method_access("method_2", "()V", access::ACC_PRIVATE),
        );
        idx.insert(ClassNode::new("a/Peek", Some("a/Hidden"), &[]).with_method("method_2", "()V"));
        idx.insert(ClassNode::new("a/Ticker", None, &[]).with_method("method_3", "()V"));
        idx.insert(ClassNode::new("a/Clock", Some("java/lang/Object"), &["a/Ticker"]).with_method("method_3", "()V"));
        Arc::new(idx)
    }

    fn override_mapping() -> Arc<Mapping> {
        let mut m = Mapping::new("intermediary", "named");
        m.add_method("a/Base", "method_1", "()V", "tick");
        m.add_method("a/Hidden", "method_2", "()V", "secret");
        m.add_method("a/Ticker", "method_3", "()V", "onTick");
        Arc::new(m)
    }

    #[test]
    fn test_overrides_take_the_inherited_name() {
        let r = RemapperBuilder::new()
            .with_mapping(override_mapping())
            .build(override_index())
            .unwrap();
        assert_eq!(r.map_method_name("a/Base", "method_1", "()V"), "tick");
        assert_eq!(r.map_method_name("a/Sub", "method_1", "()V"), "tick");
        assert_eq!(r.map_method_name("a/Leaf", "method_1", "()V"), "tick");
        assert_eq!(r.map_method_name("a/Clock", "method_3", "()V"), "onTick");
    }

    #[test]
    fn test_private_supertype_method_is_not_overridden() {
        let r = RemapperBuilder::new()
            .with_mapping(override_mapping())
            .build(override_index())
            .unwrap();
        assert_eq!(r.map_method_name("a/Hidden", "method_2", "()V"), "secret");
        assert_eq!(r.map_method_name("a/Peek", "method_2", "()V"), "method_2");
    }

    #[test]
    fn test_own_entry_beats_inherited_name() {
        let mut own = Mapping::new("intermediary", "named");
        own.add_method("a/Sub", "method_1", "()V", "subTick");
        let r = RemapperBuilder::new()
            .with_mapping(Arc::new(own))
            .with_mapping(override_mapping())
            .build(override_index())
            .unwrap();
        assert_eq!(r.map_method_name("a/Sub", "method_1", "()V"), "subTick");
        assert_eq!(r.map_method_name("a/Leaf", "method_1", "()V"), "subTick");
    }

    #[test]
    fn test_unresolved_owner_keeps_name() {
        let r = RemapperBuilder::new().with_mapping(mapping()).build(index()).unwrap();
        assert_eq!(r.map_field_name("x/Unknown", "field_1", "I"), "field_1");
        assert_eq!(r.map_method_name("net/minecraft/class_1", "<init>", "()V"), "<init>");
    }

    #[test]
    fn test_priority_order() {
        let mut high = Mapping::new("intermediary", "named");
        high.add_field("net/minecraft/class_1", "field_1", "I", "ticksLived");
        let r = RemapperBuilder::new()
            .with_mapping(Arc::new(high))
            .with_mapping(mapping())
            .build(index())
            .unwrap();
        assert_eq!(r.map_field_name("net/minecraft/class_1", "field_1", "I"), "ticksLived");
        // falls back to the lower table
        assert_eq!(r.map_class("net/minecraft/class_1"), "net/minecraft/Entity");
    }

    #[test]
    fn test_namespace_mismatch_rejected() {
        let other = Arc::new(Mapping::new("official", "named"));
        assert!(RemapperBuilder::new()
            .with_mapping(mapping())
            .with_mapping(other)
            .build(index())
            .is_err());
    }

    #[test]
    fn test_handle_before_and_after_bind() {
        let handle = RemapperHandle::new();
        let early = handle.clone();
        assert!(matches!(
            early.map_class("net/minecraft/class_1"),
            Err(WeaveError::StaleReadBeforeReady { .. })
        ));

        let r = RemapperBuilder::new().with_mapping(mapping()).build(index()).unwrap();
        handle.bind(Arc::new(r)).unwrap();
        assert!(early.is_bound());
        assert_eq!(early.map_class("net/minecraft/class_1").unwrap(), "net/minecraft/Entity");
        assert!(handle
            .bind(Arc::new(Remapper::identity(index())))
            .is_err());
    }
}
