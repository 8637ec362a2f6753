//! Whole-class model: header, members and attributes over a constant pool.

use anyhow::{bail, Context, Result};

use crate::attribute::Attribute;
use crate::bytes::{count_u16, put_u16, put_u32, ByteReader};
use crate::constant_pool::ConstantPool;

pub const MAGIC: u32 = 0xCAFE_BABE;

/// Class file major version for Java 8.
pub const JAVA_8: u16 = 52;

pub mod access {
    pub const ACC_PUBLIC: u16 = 0x0001;
    pub const ACC_PRIVATE: u16 = 0x0002;
    pub const ACC_PROTECTED: u16 = 0x0004;
    pub const ACC_STATIC: u16 = 0x0008;
    pub const ACC_FINAL: u16 = 0x0010;
    pub const ACC_SUPER: u16 = 0x0020;
    pub const ACC_SYNCHRONIZED: u16 = 0x0020;
    pub const ACC_VOLATILE: u16 = 0x0040;
    pub const ACC_BRIDGE: u16 = 0x0040;
    pub const ACC_TRANSIENT: u16 = 0x0080;
    pub const ACC_VARARGS: u16 = 0x0080;
    pub const ACC_NATIVE: u16 = 0x0100;
    pub const ACC_INTERFACE: u16 = 0x0200;
    pub const ACC_ABSTRACT: u16 = 0x0400;
    pub const ACC_STRICT: u16 = 0x0800;
    pub const ACC_SYNTHETIC: u16 = 0x1000;
    pub const ACC_ANNOTATION: u16 = 0x2000;
    pub const ACC_ENUM: u16 = 0x4000;
}

/// A `field_info` or `method_info` structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl MemberInfo {
    pub fn new(pool: &mut ConstantPool, access_flags: u16, name: &str, descriptor: &str) -> Result<Self> {
        Ok(Self {
            access_flags,
            name_index: pool.add_utf8(name)?,
            descriptor_index: pool.add_utf8(descriptor)?,
            attributes: Vec::new(),
        })
    }

    pub fn name<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str> {
        pool.utf8(self.descriptor_index)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & access::ACC_STATIC != 0
    }

    pub fn attribute(&self, pool: &ConstantPool, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is(pool, name))
    }

    fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            access_flags: r.u16()?,
            name_index: r.u16()?,
            descriptor_index: r.u16()?,
            attributes: Attribute::parse_list(r)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        put_u16(out, self.access_flags);
        put_u16(out, self.name_index);
        put_u16(out, self.descriptor_index);
        Attribute::write_list(&self.attributes, out)
    }
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    /// Zero only for `java/lang/Object` and `module-info`.
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let magic = r.u32()?;
        if magic != MAGIC {
            bail!("bad class file magic 0x{:08x}", magic);
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let pool = ConstantPool::parse(&mut r).context("Failed to parse constant pool")?;
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;
        let interface_count = r.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(r.u16()?);
        }
        let field_count = r.u16()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(MemberInfo::parse(&mut r)?);
        }
        let method_count = r.u16()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(MemberInfo::parse(&mut r)?);
        }
        let attributes = Attribute::parse_list(&mut r)?;
        if !r.is_empty() {
            bail!("{} trailing bytes after class file", r.remaining());
        }
        Ok(Self {
            minor_version,
            major_version,
            pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(1024);
        put_u32(&mut out, MAGIC);
        put_u16(&mut out, self.minor_version);
        put_u16(&mut out, self.major_version);
        self.pool.write(&mut out);
        put_u16(&mut out, self.access_flags);
        put_u16(&mut out, self.this_class);
        put_u16(&mut out, self.super_class);
        put_u16(&mut out, count_u16(self.interfaces.len(), "interfaces")?);
        for i in &self.interfaces {
            put_u16(&mut out, *i);
        }
        put_u16(&mut out, count_u16(self.fields.len(), "fields")?);
        for f in &self.fields {
            f.write(&mut out)?;
        }
        put_u16(&mut out, count_u16(self.methods.len(), "methods")?);
        for m in &self.methods {
            m.write(&mut out)?;
        }
        Attribute::write_list(&self.attributes, &mut out)?;
        Ok(out)
    }

    pub fn name(&self) -> Result<&str> {
        self.pool.class_name(self.this_class)
    }

    pub fn super_name(&self) -> Result<Option<&str>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        Ok(Some(self.pool.class_name(self.super_class)?))
    }

    pub fn interface_names(&self) -> Result<Vec<&str>> {
        self.interfaces
            .iter()
            .map(|i| self.pool.class_name(*i))
            .collect()
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & access::ACC_INTERFACE != 0
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MemberInfo> {
        self.methods.iter().find(|m| {
            m.name(&self.pool).map(|n| n == name).unwrap_or(false)
                && m.descriptor(&self.pool).map(|d| d == descriptor).unwrap_or(false)
        })
    }

    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&MemberInfo> {
        self.fields.iter().find(|f| {
            f.name(&self.pool).map(|n| n == name).unwrap_or(false)
                && f.descriptor(&self.pool).map(|d| d == descriptor).unwrap_or(false)
        })
    }
}

/// Reads only the `this_class` name, without parsing members.
pub fn peek_class_name(bytes: &[u8]) -> Result<String> {
    let mut r = ByteReader::new(bytes);
    if r.u32()? != MAGIC {
        bail!("bad class file magic");
    }
    r.u16()?;
    r.u16()?;
    let pool = ConstantPool::parse(&mut r)?;
    r.u16()?;
    let this_class = r.u16()?;
    Ok(pool.class_name(this_class)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ClassBuilder;

    #[test]
    fn test_parse_rejects_bad_magic() {
        assert!(ClassFile::parse(&[0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_built_class_reparses_identically() {
        let mut b = ClassBuilder::new("a/Foo", Some("java/lang/Object"), access::ACC_PUBLIC).unwrap();
        b.add_interface("a/Marker").unwrap();
        b.add_field(access::ACC_PRIVATE, "bar", "I").unwrap();
        let bytes = b.build().to_bytes().unwrap();

        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(parsed.name().unwrap(), "a/Foo");
        assert_eq!(parsed.super_name().unwrap(), Some("java/lang/Object"));
        assert_eq!(parsed.interface_names().unwrap(), vec!["a/Marker"]);
        assert!(parsed.find_field("bar", "I").is_some());
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
        assert_eq!(peek_class_name(&bytes).unwrap(), "a/Foo");
    }
}
