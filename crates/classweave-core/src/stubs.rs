//! Stub synthesis for types that only appear after injection.
//!
//! A name in the post-minus-pre reference delta gets a skeleton unless it is
//! under a reserved platform prefix, known to the inheritance index, one of
//! this build's generated artifacts, already present in the stub archive, or
//! already claimed in the build-wide [`StubLedger`].
//!
//! The delta is collected before renaming, so classification happens on
//! source names while stubs, the stub archive and the ledger use the renamed
//! name.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, info};

use classweave_classfile::access::*;
use classweave_classfile::opcodes::*;
use classweave_classfile::{ClassBuilder, CodeBuilder};

use crate::analyzer::{ReferenceRole, ReferenceSet};
use crate::error::WeaveError;
use crate::remapper::Remapper;

pub const DEFAULT_RESERVED_PREFIXES: &[&str] = &["java/", "javax/", "jdk/", "sun/", "com/sun/"];

pub fn default_reserved_prefixes() -> Vec<String> {
    DEFAULT_RESERVED_PREFIXES.iter().map(|p| p.to_string()).collect()
}

/// Names stubbed so far in this build, shared by all artifact jobs.
#[derive(Debug, Default)]
pub struct StubLedger {
    claimed: Mutex<HashSet<String>>,
}

impl StubLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name`; false when another job already did.
    pub fn claim(&self, name: &str) -> bool {
        self.claimed.lock().insert(name.to_string())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.claimed.lock().contains(name)
    }

    pub fn len(&self) -> usize {
        self.claimed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubShape {
    Interface,
    Class,
}

impl fmt::Display for StubShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StubShape::Interface => "interface",
            StubShape::Class => "class",
        })
    }
}

#[derive(Debug, Clone)]
pub struct StubClass {
    pub name: String,
    pub shape: StubShape,
    pub bytes: Vec<u8>,
}

impl StubClass {
    pub fn entry_name(&self) -> String {
        format!("{}.class", self.name)
    }
}

/// Interface only when every use is as an implemented interface.
pub fn stub_shape(name: &str, roles: &BTreeSet<ReferenceRole>) -> Result<StubShape, WeaveError> {
    if !roles.contains(&ReferenceRole::Interface) {
        return Ok(StubShape::Class);
    }
    if roles.len() == 1 {
        return Ok(StubShape::Interface);
    }
    Err(WeaveError::VerifierUnsafeStub {
        name: name.to_string(),
        roles: roles.iter().copied().collect(),
    })
}

pub fn build_stub(name: &str, shape: StubShape) -> Result<Vec<u8>> {
    match shape {
        StubShape::Interface => {
            let b = ClassBuilder::new(
                name,
                Some("java/lang/Object"),
                ACC_PUBLIC | ACC_ABSTRACT | ACC_INTERFACE,
            )?;
            b.build().to_bytes()
        }
        StubShape::Class => {
            let mut b = ClassBuilder::new(name, Some("java/lang/Object"), ACC_PUBLIC | ACC_SUPER)?;
            let init = b.pool_mut().add_method_ref("java/lang/Object", "<init>", "()V")?;
            let mut code = CodeBuilder::new(1, 1);
            code.aload(0).invoke(INVOKESPECIAL, init).op(RETURN);
            b.add_method(ACC_PUBLIC, "<init>", "()V", Some(code.finish()))?;
            b.build().to_bytes()
        }
    }
}

/// Decides which delta names need stubs for one artifact.
pub struct StubSynthesizer<'a> {
    reserved: &'a [String],
    remapper: &'a Remapper,
    generated: &'a BTreeSet<String>,
    existing: &'a HashSet<String>,
    ledger: &'a StubLedger,
}

impl<'a> StubSynthesizer<'a> {
    pub fn new(
        reserved: &'a [String],
        remapper: &'a Remapper,
        generated: &'a BTreeSet<String>,
        existing: &'a HashSet<String>,
        ledger: &'a StubLedger,
    ) -> Self {
        Self {
            reserved,
            remapper,
            generated,
            existing,
            ledger,
        }
    }

    fn is_backed(&self, source: &str, target: &str) -> bool {
        self.remapper.index().contains(source) || self.generated.contains(source) || self.existing.contains(target)
    }

    /// Classifies every candidate first, so an unsafe name aborts before
    /// anything is claimed in the ledger.
    pub fn synthesize(&self, delta: &ReferenceSet) -> Result<Vec<StubClass>> {
        let delta = delta.without_prefixes(self.reserved);
        let mut planned = Vec::new();
        for (source, roles) in delta.iter() {
            let name = self.remapper.map_class(source);
            if self.is_backed(source, &name) {
                continue;
            }
            planned.push((name, stub_shape(source, roles)?));
        }

        let mut stubs = Vec::new();
        for (name, shape) in planned {
            if !self.ledger.claim(&name) {
                debug!("Stub {} already emitted in this build", name);
                continue;
            }
            let bytes = build_stub(&name, shape)?;
            info!("Synthesized {} stub {}", shape, name);
            stubs.push(StubClass { name, shape, bytes });
        }
        Ok(stubs)
    }
}
