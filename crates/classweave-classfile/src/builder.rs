//! Builders for generating new classes and straight-line method bodies.

use anyhow::{bail, Result};

use crate::attribute::{Attribute, CodeAttribute};
use crate::class::{ClassFile, MemberInfo, JAVA_8};
use crate::constant_pool::ConstantPool;
use crate::descriptor::FieldType;
use crate::opcodes;

pub struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    /// Starts a Java 8 class. `super_name` is `None` only for `java/lang/Object`.
    pub fn new(name: &str, super_name: Option<&str>, access_flags: u16) -> Result<Self> {
        let mut pool = ConstantPool::new();
        let this_class = pool.add_class(name)?;
        let super_class = match super_name {
            Some(s) => pool.add_class(s)?,
            None => 0,
        };
        Ok(Self {
            class: ClassFile {
                minor_version: 0,
                major_version: JAVA_8,
                pool,
                access_flags,
                this_class,
                super_class,
                interfaces: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                attributes: Vec::new(),
            },
        })
    }

    pub fn pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.class.pool
    }

    pub fn add_interface(&mut self, name: &str) -> Result<()> {
        let index = self.class.pool.add_class(name)?;
        if !self.class.interfaces.contains(&index) {
            self.class.interfaces.push(index);
        }
        Ok(())
    }

    pub fn add_field(&mut self, access_flags: u16, name: &str, descriptor: &str) -> Result<&mut MemberInfo> {
        let field = MemberInfo::new(&mut self.class.pool, access_flags, name, descriptor)?;
        self.class.fields.push(field);
        let last = self.class.fields.len() - 1;
        Ok(&mut self.class.fields[last])
    }

    /// Adds a method; `code` is `None` for abstract methods.
    pub fn add_method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        code: Option<CodeAttribute>,
    ) -> Result<&mut MemberInfo> {
        let mut method = MemberInfo::new(&mut self.class.pool, access_flags, name, descriptor)?;
        if let Some(code) = code {
            method.attributes.push(code.into_attribute(&mut self.class.pool)?);
        }
        self.class.methods.push(method);
        let last = self.class.methods.len() - 1;
        Ok(&mut self.class.methods[last])
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.class.attributes.push(attribute);
    }

    pub fn build(self) -> ClassFile {
        self.class
    }
}

/// Emits bytecode for simple methods without branches, so no
/// `StackMapTable` is needed. Stack and local sizes are supplied by the
/// caller.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    code: Vec<u8>,
    max_stack: u16,
    max_locals: u16,
}

impl CodeBuilder {
    pub fn new(max_stack: u16, max_locals: u16) -> Self {
        Self {
            code: Vec::new(),
            max_stack,
            max_locals,
        }
    }

    pub fn op(&mut self, opcode: u8) -> &mut Self {
        self.code.push(opcode);
        self
    }

    fn op_u16(&mut self, opcode: u8, operand: u16) -> &mut Self {
        self.code.push(opcode);
        self.code.extend_from_slice(&operand.to_be_bytes());
        self
    }

    /// `xload` of `ty` from local `slot`, using the short forms when possible.
    pub fn load(&mut self, ty: &FieldType, slot: u16) -> &mut Self {
        let opcode = ty.load_opcode();
        let kind = opcode - opcodes::ILOAD;
        if slot <= 3 {
            self.op(opcodes::ILOAD_0 + kind * 4 + slot as u8)
        } else if slot <= u8::MAX as u16 {
            self.code.push(opcode);
            self.code.push(slot as u8);
            self
        } else {
            self.code.push(opcodes::WIDE);
            self.op_u16(opcode, slot)
        }
    }

    pub fn aload(&mut self, slot: u16) -> &mut Self {
        self.load(&FieldType::Object(String::new()), slot)
    }

    /// Loads consecutive locals starting at `first_slot`; returns the next free slot.
    pub fn load_all(&mut self, params: &[FieldType], first_slot: u16) -> u16 {
        let mut slot = first_slot;
        for p in params {
            self.load(p, slot);
            slot += p.slots();
        }
        slot
    }

    /// `getstatic`/`putstatic`/`getfield`/`putfield`.
    pub fn field(&mut self, opcode: u8, field_ref: u16) -> &mut Self {
        self.op_u16(opcode, field_ref)
    }

    /// `invokevirtual`/`invokespecial`/`invokestatic`.
    pub fn invoke(&mut self, opcode: u8, method_ref: u16) -> &mut Self {
        self.op_u16(opcode, method_ref)
    }

    /// `invokeinterface`; `arg_slots` excludes the receiver.
    pub fn invoke_interface(&mut self, method_ref: u16, arg_slots: u16) -> Result<&mut Self> {
        let count = arg_slots + 1;
        if count > u8::MAX as u16 {
            bail!("invokeinterface with {} argument slots", arg_slots);
        }
        self.op_u16(opcodes::INVOKEINTERFACE, method_ref);
        self.code.push(count as u8);
        self.code.push(0);
        Ok(self)
    }

    /// `new`/`checkcast`/`anewarray`/`instanceof`.
    pub fn type_insn(&mut self, opcode: u8, class_ref: u16) -> &mut Self {
        self.op_u16(opcode, class_ref)
    }

    pub fn finish(self) -> CodeAttribute {
        CodeAttribute {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code: self.code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }
}
