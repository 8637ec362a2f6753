//! Attributes: kept raw by default, with typed views for the ones the
//! rewriting stages need to look inside.

use anyhow::{bail, Result};

use crate::bytes::{count_u16, put_u16, put_u32, ByteReader};
use crate::constant_pool::ConstantPool;

pub mod names {
    pub const CODE: &str = "Code";
    pub const CONSTANT_VALUE: &str = "ConstantValue";
    pub const SIGNATURE: &str = "Signature";
    pub const SOURCE_FILE: &str = "SourceFile";
    pub const EXCEPTIONS: &str = "Exceptions";
    pub const INNER_CLASSES: &str = "InnerClasses";
    pub const ENCLOSING_METHOD: &str = "EnclosingMethod";
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
    pub const STACK_MAP_TABLE: &str = "StackMapTable";
    pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
    pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
    pub const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
    pub const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str =
        "RuntimeInvisibleParameterAnnotations";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl Attribute {
    pub fn new(pool: &mut ConstantPool, name: &str, info: Vec<u8>) -> Result<Self> {
        Ok(Self {
            name_index: pool.add_utf8(name)?,
            info,
        })
    }

    pub fn name<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str> {
        pool.utf8(self.name_index)
    }

    pub fn is(&self, pool: &ConstantPool, name: &str) -> bool {
        pool.utf8(self.name_index).map(|n| n == name).unwrap_or(false)
    }

    /// Reads a single `u16` payload (`Signature`, `SourceFile`, `ConstantValue`).
    pub fn u16_payload(&self) -> Result<u16> {
        if self.info.len() != 2 {
            bail!("attribute payload is {} bytes, expected 2", self.info.len());
        }
        Ok(u16::from_be_bytes([self.info[0], self.info[1]]))
    }

    pub fn parse_list(reader: &mut ByteReader<'_>) -> Result<Vec<Attribute>> {
        let count = reader.u16()?;
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_index = reader.u16()?;
            let info = reader.length_prefixed()?.to_vec();
            out.push(Attribute { name_index, info });
        }
        Ok(out)
    }

    pub fn write_list(attributes: &[Attribute], out: &mut Vec<u8>) -> Result<()> {
        put_u16(out, count_u16(attributes.len(), "attributes")?);
        for attr in attributes {
            put_u16(out, attr.name_index);
            put_u32(out, attr.info.len() as u32);
            out.extend_from_slice(&attr.info);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    pub fn parse(info: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(info);
        let max_stack = r.u16()?;
        let max_locals = r.u16()?;
        let code = r.length_prefixed()?.to_vec();
        let handlers = r.u16()?;
        let mut exception_table = Vec::with_capacity(handlers as usize);
        for _ in 0..handlers {
            exception_table.push(ExceptionEntry {
                start_pc: r.u16()?,
                end_pc: r.u16()?,
                handler_pc: r.u16()?,
                catch_type: r.u16()?,
            });
        }
        let attributes = Attribute::parse_list(&mut r)?;
        if !r.is_empty() {
            bail!("{} trailing bytes in Code attribute", r.remaining());
        }
        Ok(Self {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.code.len() + 32);
        put_u16(&mut out, self.max_stack);
        put_u16(&mut out, self.max_locals);
        put_u32(&mut out, self.code.len() as u32);
        out.extend_from_slice(&self.code);
        put_u16(
            &mut out,
            count_u16(self.exception_table.len(), "exception handlers")?,
        );
        for e in &self.exception_table {
            put_u16(&mut out, e.start_pc);
            put_u16(&mut out, e.end_pc);
            put_u16(&mut out, e.handler_pc);
            put_u16(&mut out, e.catch_type);
        }
        Attribute::write_list(&self.attributes, &mut out)?;
        Ok(out)
    }

    pub fn into_attribute(self, pool: &mut ConstantPool) -> Result<Attribute> {
        let info = self.to_bytes()?;
        Attribute::new(pool, names::CODE, info)
    }
}

/// One row of a `LocalVariableTable` or `LocalVariableTypeTable`.
/// `descriptor_index` holds the signature for the type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

pub fn parse_local_variables(info: &[u8]) -> Result<Vec<LocalVariable>> {
    let mut r = ByteReader::new(info);
    let count = r.u16()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(LocalVariable {
            start_pc: r.u16()?,
            length: r.u16()?,
            name_index: r.u16()?,
            descriptor_index: r.u16()?,
            index: r.u16()?,
        });
    }
    Ok(out)
}

pub fn write_local_variables(vars: &[LocalVariable]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(2 + vars.len() * 10);
    put_u16(&mut out, count_u16(vars.len(), "local variables")?);
    for v in vars {
        put_u16(&mut out, v.start_pc);
        put_u16(&mut out, v.length);
        put_u16(&mut out, v.name_index);
        put_u16(&mut out, v.descriptor_index);
        put_u16(&mut out, v.index);
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerClass {
    pub inner_class_info_index: u16,
    pub outer_class_info_index: u16,
    pub inner_name_index: u16,
    pub access_flags: u16,
}

pub fn parse_inner_classes(info: &[u8]) -> Result<Vec<InnerClass>> {
    let mut r = ByteReader::new(info);
    let count = r.u16()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(InnerClass {
            inner_class_info_index: r.u16()?,
            outer_class_info_index: r.u16()?,
            inner_name_index: r.u16()?,
            access_flags: r.u16()?,
        });
    }
    Ok(out)
}

pub fn write_inner_classes(entries: &[InnerClass]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(2 + entries.len() * 8);
    put_u16(&mut out, count_u16(entries.len(), "inner classes")?);
    for e in entries {
        put_u16(&mut out, e.inner_class_info_index);
        put_u16(&mut out, e.outer_class_info_index);
        put_u16(&mut out, e.inner_name_index);
        put_u16(&mut out, e.access_flags);
    }
    Ok(out)
}
