//! Streaming visitor chain over a class.
//!
//! A [`ClassReader`] drives events in read order (header, fields, methods,
//! class attributes, end) into the first stage. Each stage owns the next one
//! and forwards, rewrites, drops or adds events. The constant pool travels
//! with every event so stages can resolve and append entries; a
//! [`ClassWriter`] at the end of the chain assembles the final bytes.

use anyhow::{anyhow, Result};

use crate::attribute::Attribute;
use crate::class::{ClassFile, MemberInfo};
use crate::constant_pool::ConstantPool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
}

pub trait ClassVisitor {
    fn visit_header(&mut self, pool: &mut ConstantPool, header: ClassHeader) -> Result<()>;

    fn visit_field(&mut self, pool: &mut ConstantPool, field: MemberInfo) -> Result<()>;

    fn visit_method(&mut self, pool: &mut ConstantPool, method: MemberInfo) -> Result<()>;

    fn visit_attribute(&mut self, pool: &mut ConstantPool, attribute: Attribute) -> Result<()>;

    fn visit_end(&mut self, pool: &mut ConstantPool) -> Result<()>;
}

impl<V: ClassVisitor + ?Sized> ClassVisitor for &mut V {
    fn visit_header(&mut self, pool: &mut ConstantPool, header: ClassHeader) -> Result<()> {
        (**self).visit_header(pool, header)
    }

    fn visit_field(&mut self, pool: &mut ConstantPool, field: MemberInfo) -> Result<()> {
        (**self).visit_field(pool, field)
    }

    fn visit_method(&mut self, pool: &mut ConstantPool, method: MemberInfo) -> Result<()> {
        (**self).visit_method(pool, method)
    }

    fn visit_attribute(&mut self, pool: &mut ConstantPool, attribute: Attribute) -> Result<()> {
        (**self).visit_attribute(pool, attribute)
    }

    fn visit_end(&mut self, pool: &mut ConstantPool) -> Result<()> {
        (**self).visit_end(pool)
    }
}

pub struct ClassReader {
    class: ClassFile,
}

impl ClassReader {
    pub fn new(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            class: ClassFile::parse(bytes)?,
        })
    }

    pub fn from_class(class: ClassFile) -> Self {
        Self { class }
    }

    pub fn class(&self) -> &ClassFile {
        &self.class
    }

    pub fn accept<V: ClassVisitor + ?Sized>(self, visitor: &mut V) -> Result<()> {
        let ClassFile {
            minor_version,
            major_version,
            mut pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        } = self.class;

        visitor.visit_header(
            &mut pool,
            ClassHeader {
                minor_version,
                major_version,
                access_flags,
                this_class,
                super_class,
                interfaces,
            },
        )?;
        for field in fields {
            visitor.visit_field(&mut pool, field)?;
        }
        for method in methods {
            visitor.visit_method(&mut pool, method)?;
        }
        for attribute in attributes {
            visitor.visit_attribute(&mut pool, attribute)?;
        }
        visitor.visit_end(&mut pool)
    }
}

/// Terminal stage: collects events and serializes on `visit_end`.
#[derive(Debug, Default)]
pub struct ClassWriter {
    header: Option<ClassHeader>,
    fields: Vec<MemberInfo>,
    methods: Vec<MemberInfo>,
    attributes: Vec<Attribute>,
    class: Option<ClassFile>,
}

impl ClassWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_class(self) -> Result<ClassFile> {
        self.class
            .ok_or_else(|| anyhow!("class writer did not receive visit_end"))
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        self.into_class()?.to_bytes()
    }
}

impl ClassVisitor for ClassWriter {
    fn visit_header(&mut self, _pool: &mut ConstantPool, header: ClassHeader) -> Result<()> {
        self.header = Some(header);
        Ok(())
    }

    fn visit_field(&mut self, _pool: &mut ConstantPool, field: MemberInfo) -> Result<()> {
        self.fields.push(field);
        Ok(())
    }

    fn visit_method(&mut self, _pool: &mut ConstantPool, method: MemberInfo) -> Result<()> {
        self.methods.push(method);
        Ok(())
    }

    fn visit_attribute(&mut self, _pool: &mut ConstantPool, attribute: Attribute) -> Result<()> {
        self.attributes.push(attribute);
        Ok(())
    }

    fn visit_end(&mut self, pool: &mut ConstantPool) -> Result<()> {
        let header = self
            .header
            .take()
            .ok_or_else(|| anyhow!("class writer reached visit_end without a header"))?;
        self.class = Some(ClassFile {
            minor_version: header.minor_version,
            major_version: header.major_version,
            pool: pool.clone(),
            access_flags: header.access_flags,
            this_class: header.this_class,
            super_class: header.super_class,
            interfaces: header.interfaces,
            fields: std::mem::take(&mut self.fields),
            methods: std::mem::take(&mut self.methods),
            attributes: std::mem::take(&mut self.attributes),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ClassBuilder, CodeBuilder};
    use crate::class::access::*;

    fn sample() -> Vec<u8> {
        let mut b = ClassBuilder::new("a/Foo", Some("java/lang/Object"), ACC_PUBLIC | ACC_SUPER).unwrap();
        b.add_field(ACC_PRIVATE, "bar", "I").unwrap();
        let mut code = CodeBuilder::new(1, 1);
        code.aload(0).op(crate::opcodes::ARETURN);
        b.add_method(ACC_PUBLIC, "self", "()La/Foo;", Some(code.finish())).unwrap();
        b.build().to_bytes().unwrap()
    }

    #[test]
    fn test_reader_to_writer_is_identity() {
        let bytes = sample();
        let mut writer = ClassWriter::new();
        ClassReader::new(&bytes).unwrap().accept(&mut writer).unwrap();
        assert_eq!(writer.into_bytes().unwrap(), bytes);
    }

    struct DropFields<V> {
        next: V,
    }

    impl<V: ClassVisitor> ClassVisitor for DropFields<V> {
        fn visit_header(&mut self, pool: &mut ConstantPool, header: ClassHeader) -> Result<()> {
            self.next.visit_header(pool, header)
        }
        fn visit_field(&mut self, _pool: &mut ConstantPool, _field: MemberInfo) -> Result<()> {
            Ok(())
        }
        fn visit_method(&mut self, pool: &mut ConstantPool, method: MemberInfo) -> Result<()> {
            self.next.visit_method(pool, method)
        }
        fn visit_attribute(&mut self, pool: &mut ConstantPool, attribute: Attribute) -> Result<()> {
            self.next.visit_attribute(pool, attribute)
        }
        fn visit_end(&mut self, pool: &mut ConstantPool) -> Result<()> {
            self.next.visit_end(pool)
        }
    }

    #[test]
    fn test_stage_can_drop_events() {
        let mut writer = ClassWriter::new();
        let mut stage = DropFields { next: &mut writer };
        ClassReader::new(&sample()).unwrap().accept(&mut stage).unwrap();
        let class = writer.into_class().unwrap();
        assert!(class.fields.is_empty());
        assert_eq!(class.methods.len(), 1);
    }

    #[test]
    fn test_writer_without_end_fails() {
        assert!(ClassWriter::new().into_bytes().is_err());
    }
}
