//! Constant pool model with interning.
//!
//! Entries read from a class file keep their indices and order, so a pool
//! that is never modified writes back byte-for-byte. New entries are always
//! appended; `add_*` helpers return the index of an existing identical entry
//! when there is one.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};

use crate::bytes::{put_u16, put_u32, put_u64, put_u8, ByteReader};
use crate::mutf8;

pub mod tags {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// A single constant pool entry. Float and double payloads are kept as raw
/// bits so entries can be hashed and compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Utf8(String),
    /// Modified UTF-8 that has no `String` form; written back verbatim.
    RawUtf8(Vec<u8>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    /// Slot 0 and the second slot of a long or double.
    Unusable,
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// Which kind of symbolic member reference an entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Field,
    Method,
    InterfaceMethod,
}

/// Resolved view of a field/method reference entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub kind: RefKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    lookup: HashMap<Constant, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
            lookup: HashMap::new(),
        }
    }

    /// The `constant_pool_count` value: number of slots including slot 0.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => {
                Err(anyhow!("invalid constant pool index {}", index))
            }
            Some(c) => Ok(c),
        }
    }

    /// Iterates over usable entries with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }

    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            Constant::RawUtf8(_) => bail!(
                "constant pool entry {} is not representable as a string",
                index
            ),
            other => bail!("constant pool entry {} is not Utf8: {:?}", index, other),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            other => bail!("constant pool entry {} is not a Class: {:?}", index, other),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            other => bail!(
                "constant pool entry {} is not a NameAndType: {:?}",
                index,
                other
            ),
        }
    }

    pub fn member_ref(&self, index: u16) -> Result<MemberRef> {
        let (kind, class_index, nat) = match self.get(index)? {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            } => (RefKind::Field, *class_index, *name_and_type_index),
            Constant::MethodRef {
                class_index,
                name_and_type_index,
            } => (RefKind::Method, *class_index, *name_and_type_index),
            Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => (RefKind::InterfaceMethod, *class_index, *name_and_type_index),
            other => bail!(
                "constant pool entry {} is not a member reference: {:?}",
                index,
                other
            ),
        };
        let (name, descriptor) = self.name_and_type(nat)?;
        Ok(MemberRef {
            kind,
            owner: self.class_name(class_index)?.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// Appends `constant` unless an identical entry exists.
    pub fn intern(&mut self, constant: Constant) -> Result<u16> {
        if let Some(&index) = self.lookup.get(&constant) {
            return Ok(index);
        }
        let index = self.entries.len();
        let needed = if constant.is_wide() { 2 } else { 1 };
        if index + needed > u16::MAX as usize {
            bail!("constant pool overflow ({} entries)", index);
        }
        let index = index as u16;
        let wide = constant.is_wide();
        self.lookup.insert(constant.clone(), index);
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    /// Replaces the entry at `index` in place. Other entries pointing at
    /// `index` observe the new value.
    pub fn replace(&mut self, index: u16, constant: Constant) -> Result<()> {
        let old = self.get(index)?.clone();
        if old.is_wide() != constant.is_wide() {
            bail!("cannot change slot width of constant pool entry {}", index);
        }
        if self.lookup.get(&old) == Some(&index) {
            self.lookup.remove(&old);
        }
        self.lookup.entry(constant.clone()).or_insert(index);
        self.entries[index as usize] = constant;
        Ok(())
    }

    pub fn add_utf8(&mut self, value: &str) -> Result<u16> {
        self.intern(Constant::Utf8(value.to_string()))
    }

    pub fn add_class(&mut self, name: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        self.intern(Constant::Class { name_index })
    }

    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        let string_index = self.add_utf8(value)?;
        self.intern(Constant::String { string_index })
    }

    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.intern(Constant::Integer(value))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.intern(Constant::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    pub fn add_member_ref(
        &mut self,
        kind: RefKind,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.intern(match kind {
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
        })
    }

    pub fn add_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        self.add_member_ref(RefKind::Field, owner, name, descriptor)
    }

    pub fn add_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        self.add_member_ref(RefKind::Method, owner, name, descriptor)
    }

    pub fn add_interface_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        self.add_member_ref(RefKind::InterfaceMethod, owner, name, descriptor)
    }

    pub fn parse(reader: &mut ByteReader<'_>) -> Result<Self> {
        let count = reader.u16()? as usize;
        let mut pool = Self::new();
        while pool.entries.len() < count {
            let index = pool.entries.len() as u16;
            let tag = reader.u8()?;
            let constant = match tag {
                tags::UTF8 => {
                    let len = reader.u16()? as usize;
                    let raw = reader.bytes(len)?;
                    match mutf8::decode(raw) {
                        Some(s) => Constant::Utf8(s),
                        None => Constant::RawUtf8(raw.to_vec()),
                    }
                }
                tags::INTEGER => Constant::Integer(reader.u32()? as i32),
                tags::FLOAT => Constant::Float(reader.u32()?),
                tags::LONG => Constant::Long(reader.u64()? as i64),
                tags::DOUBLE => Constant::Double(reader.u64()?),
                tags::CLASS => Constant::Class {
                    name_index: reader.u16()?,
                },
                tags::STRING => Constant::String {
                    string_index: reader.u16()?,
                },
                tags::FIELD_REF => Constant::FieldRef {
                    class_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                tags::METHOD_REF => Constant::MethodRef {
                    class_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                tags::INTERFACE_METHOD_REF => Constant::InterfaceMethodRef {
                    class_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                tags::NAME_AND_TYPE => Constant::NameAndType {
                    name_index: reader.u16()?,
                    descriptor_index: reader.u16()?,
                },
                tags::METHOD_HANDLE => Constant::MethodHandle {
                    reference_kind: reader.u8()?,
                    reference_index: reader.u16()?,
                },
                tags::METHOD_TYPE => Constant::MethodType {
                    descriptor_index: reader.u16()?,
                },
                tags::DYNAMIC => Constant::Dynamic {
                    bootstrap_method_attr_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                tags::INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: reader.u16()?,
                    name_and_type_index: reader.u16()?,
                },
                tags::MODULE => Constant::Module {
                    name_index: reader.u16()?,
                },
                tags::PACKAGE => Constant::Package {
                    name_index: reader.u16()?,
                },
                other => bail!("unknown constant pool tag {} at index {}", other, index),
            };
            let wide = constant.is_wide();
            pool.lookup.entry(constant.clone()).or_insert(index);
            pool.entries.push(constant);
            if wide {
                pool.entries.push(Constant::Unusable);
            }
        }
        if pool.entries.len() != count {
            bail!("wide constant overruns constant pool count {}", count);
        }
        Ok(pool)
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        put_u16(out, self.entries.len() as u16);
        for constant in self.entries.iter().skip(1) {
            match constant {
                Constant::Unusable => {}
                Constant::Utf8(s) => {
                    let encoded = mutf8::encode(s);
                    put_u8(out, tags::UTF8);
                    put_u16(out, encoded.len() as u16);
                    out.extend_from_slice(&encoded);
                }
                Constant::RawUtf8(raw) => {
                    put_u8(out, tags::UTF8);
                    put_u16(out, raw.len() as u16);
                    out.extend_from_slice(raw);
                }
                Constant::Integer(v) => {
                    put_u8(out, tags::INTEGER);
                    put_u32(out, *v as u32);
                }
                Constant::Float(bits) => {
                    put_u8(out, tags::FLOAT);
                    put_u32(out, *bits);
                }
                Constant::Long(v) => {
                    put_u8(out, tags::LONG);
                    put_u64(out, *v as u64);
                }
                Constant::Double(bits) => {
                    put_u8(out, tags::DOUBLE);
                    put_u64(out, *bits);
                }
                Constant::Class { name_index } => {
                    put_u8(out, tags::CLASS);
                    put_u16(out, *name_index);
                }
                Constant::String { string_index } => {
                    put_u8(out, tags::STRING);
                    put_u16(out, *string_index);
                }
                Constant::FieldRef {
                    class_index,
                    name_and_type_index,
                } => {
                    put_u8(out, tags::FIELD_REF);
                    put_u16(out, *class_index);
                    put_u16(out, *name_and_type_index);
                }
                Constant::MethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    put_u8(out, tags::METHOD_REF);
                    put_u16(out, *class_index);
                    put_u16(out, *name_and_type_index);
                }
                Constant::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    put_u8(out, tags::INTERFACE_METHOD_REF);
                    put_u16(out, *class_index);
                    put_u16(out, *name_and_type_index);
                }
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    put_u8(out, tags::NAME_AND_TYPE);
                    put_u16(out, *name_index);
                    put_u16(out, *descriptor_index);
                }
                Constant::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    put_u8(out, tags::METHOD_HANDLE);
                    put_u8(out, *reference_kind);
                    put_u16(out, *reference_index);
                }
                Constant::MethodType { descriptor_index } => {
                    put_u8(out, tags::METHOD_TYPE);
                    put_u16(out, *descriptor_index);
                }
                Constant::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => {
                    put_u8(out, tags::DYNAMIC);
                    put_u16(out, *bootstrap_method_attr_index);
                    put_u16(out, *name_and_type_index);
                }
                Constant::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => {
                    put_u8(out, tags::INVOKE_DYNAMIC);
                    put_u16(out, *bootstrap_method_attr_index);
                    put_u16(out, *name_and_type_index);
                }
                Constant::Module { name_index } => {
                    put_u8(out, tags::MODULE);
                    put_u16(out, *name_index);
                }
                Constant::Package { name_index } => {
                    put_u8(out, tags::PACKAGE);
                    put_u16(out, *name_index);
                }
            }
        }
    }
}
