//! Minimal bytecode interpreter for generated code.
//!
//! Runs the straight-line bodies the engine emits (loads, field access,
//! invokes, returns) against classes loaded from bytes or archives. Objects
//! are bags of named fields; no constructors run and casts always succeed.

use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::path::Path;

use classweave_archive::read_archive;
use classweave_classfile::attribute::names;
use classweave_classfile::constant_pool::Constant;
use classweave_classfile::opcodes::*;
use classweave_classfile::{ClassFile, CodeAttribute, MethodDescriptor};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Ref(Option<usize>),
    Str(String),
    /// Upper half of a long or double local.
    Top,
}

impl Value {
    pub fn default_for(descriptor: &str) -> Value {
        match descriptor.as_bytes().first() {
            Some(b'J') => Value::Long(0),
            Some(b'F') => Value::Float(0.0),
            Some(b'D') => Value::Double(0.0),
            Some(b'L') | Some(b'[') => Value::Ref(None),
            _ => Value::Int(0),
        }
    }

    fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }
}

#[derive(Debug, Clone)]
struct Object {
    class: String,
    fields: HashMap<String, Value>,
}

#[derive(Debug, Default)]
pub struct Machine {
    classes: HashMap<String, ClassFile>,
    heap: Vec<Object>,
    statics: HashMap<(String, String), Value>,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, bytes: &[u8]) -> Result<String> {
        let class = ClassFile::parse(bytes)?;
        let name = class.name()?.to_string();
        self.classes.insert(name.clone(), class);
        Ok(name)
    }

    pub fn load_archive(&mut self, path: &Path) -> Result<usize> {
        let mut loaded = 0;
        for entry in read_archive(path)? {
            if entry.class_name().is_some() {
                self.load(&entry.data)?;
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn instantiate(&mut self, class: &str) -> Value {
        self.heap.push(Object {
            class: class.to_string(),
            fields: HashMap::new(),
        });
        Value::Ref(Some(self.heap.len() - 1))
    }

    pub fn field(&self, object: &Value, name: &str) -> Option<Value> {
        match object {
            Value::Ref(Some(id)) => self.heap[*id].fields.get(name).cloned(),
            _ => None,
        }
    }

    pub fn static_field(&self, owner: &str, name: &str) -> Option<Value> {
        self.statics.get(&(owner.to_string(), name.to_string())).cloned()
    }

    /// Calls a method declared on `owner` or one of its loaded superclasses.
    /// For instance methods `args[0]` is the receiver.
    pub fn invoke(&mut self, owner: &str, name: &str, descriptor: &str, args: Vec<Value>) -> Result<Option<Value>> {
        let (declaring, code) = self.find_code(owner, name, descriptor)?;
        self.execute(&declaring, &code, args)
    }

    fn find_code(&self, owner: &str, name: &str, descriptor: &str) -> Result<(String, CodeAttribute)> {
        let mut current = owner.to_string();
        loop {
            let class = self
                .classes
                .get(&current)
                .ok_or_else(|| anyhow!("class {} is not loaded (looking up {}.{}{})", current, owner, name, descriptor))?;
            if let Some(method) = class.find_method(name, descriptor) {
                let attr = method
                    .attribute(&class.pool, names::CODE)
                    .ok_or_else(|| anyhow!("{}.{}{} has no code", current, name, descriptor))?;
                return Ok((current, CodeAttribute::parse(&attr.info)?));
            }
            match class.super_name()? {
                Some(parent) => current = parent.to_string(),
                None => bail!("no method {}.{}{}", owner, name, descriptor),
            }
        }
    }

    fn runtime_class(&self, receiver: &Value) -> Result<String> {
        match receiver {
            Value::Ref(Some(id)) => Ok(self.heap[*id].class.clone()),
            Value::Ref(None) => bail!("NullPointerException"),
            other => bail!("receiver is not an object: {:?}", other),
        }
    }

    fn execute(&mut self, class: &str, code: &CodeAttribute, args: Vec<Value>) -> Result<Option<Value>> {
        let mut locals = Vec::with_capacity(code.max_locals as usize);
        for arg in args {
            let wide = arg.is_wide();
            locals.push(arg);
            if wide {
                locals.push(Value::Top);
            }
        }
        locals.resize(code.max_locals.max(locals.len() as u16) as usize, Value::Top);

        let pool = self
            .classes
            .get(class)
            .ok_or_else(|| anyhow!("class {} is not loaded", class))?
            .pool
            .clone();
        let bytes = &code.code;
        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0;
        let u16_at = |pc: usize| u16::from_be_bytes([bytes[pc + 1], bytes[pc + 2]]);

        loop {
            let opcode = *bytes.get(pc).ok_or_else(|| anyhow!("fell off the end of {}", class))?;
            match opcode {
                ILOAD_0..=0x2d => {
                    let slot = ((opcode - ILOAD_0) % 4) as usize;
                    stack.push(locals[slot].clone());
                    pc += 1;
                }
                ILOAD..=ALOAD => {
                    stack.push(locals[bytes[pc + 1] as usize].clone());
                    pc += 2;
                }
                ACONST_NULL => {
                    stack.push(Value::Ref(None));
                    pc += 1;
                }
                DUP => {
                    let top = stack.last().cloned().ok_or_else(|| anyhow!("dup on empty stack"))?;
                    stack.push(top);
                    pc += 1;
                }
                POP => {
                    stack.pop();
                    pc += 1;
                }
                LDC => {
                    let index = bytes[pc + 1] as u16;
                    stack.push(match pool.get(index)? {
                        Constant::Integer(v) => Value::Int(*v),
                        Constant::String { string_index } => Value::Str(pool.utf8(*string_index)?.to_string()),
                        other => bail!("unsupported ldc constant {:?}", other),
                    });
                    pc += 2;
                }
                GETFIELD => {
                    let member = pool.member_ref(u16_at(pc))?;
                    let object = stack.pop().ok_or_else(|| anyhow!("getfield on empty stack"))?;
                    let value = self
                        .field(&object, &member.name)
                        .unwrap_or_else(|| Value::default_for(&member.descriptor));
                    stack.push(value);
                    pc += 3;
                }
                PUTFIELD => {
                    let member = pool.member_ref(u16_at(pc))?;
                    let value = stack.pop().ok_or_else(|| anyhow!("putfield on empty stack"))?;
                    let object = stack.pop().ok_or_else(|| anyhow!("putfield on empty stack"))?;
                    match object {
                        Value::Ref(Some(id)) => {
                            self.heap[id].fields.insert(member.name, value);
                        }
                        other => bail!("putfield on {:?}", other),
                    }
                    pc += 3;
                }
                GETSTATIC => {
                    let member = pool.member_ref(u16_at(pc))?;
                    let value = self
                        .static_field(&member.owner, &member.name)
                        .unwrap_or_else(|| Value::default_for(&member.descriptor));
                    stack.push(value);
                    pc += 3;
                }
                PUTSTATIC => {
                    let member = pool.member_ref(u16_at(pc))?;
                    let value = stack.pop().ok_or_else(|| anyhow!("putstatic on empty stack"))?;
                    self.statics.insert((member.owner, member.name), value);
                    pc += 3;
                }
                INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE => {
                    let member = pool.member_ref(u16_at(pc))?;
                    let md = MethodDescriptor::parse(&member.descriptor)?;
                    let mut call_args = Vec::with_capacity(md.params.len() + 1);
                    for _ in 0..md.params.len() {
                        call_args.push(stack.pop().ok_or_else(|| anyhow!("missing argument"))?);
                    }
                    let target = if opcode == INVOKESTATIC {
                        member.owner.clone()
                    } else {
                        let receiver = stack.pop().ok_or_else(|| anyhow!("missing receiver"))?;
                        let target = if opcode == INVOKESPECIAL {
                            member.owner.clone()
                        } else {
                            self.runtime_class(&receiver)?
                        };
                        call_args.push(receiver);
                        target
                    };
                    call_args.reverse();
                    pc += if opcode == INVOKEINTERFACE { 5 } else { 3 };
                    if member.name == "<init>" && !self.is_loaded(&target) {
                        continue;
                    }
                    if let Some(result) = self.invoke(&target, &member.name, &member.descriptor, call_args)? {
                        stack.push(result);
                    }
                }
                NEW => {
                    let name = pool.class_name(u16_at(pc))?.to_string();
                    let object = self.instantiate(&name);
                    stack.push(object);
                    pc += 3;
                }
                CHECKCAST => pc += 3,
                ATHROW => bail!("exception thrown in {}", class),
                IRETURN..=ARETURN => {
                    return Ok(Some(stack.pop().ok_or_else(|| anyhow!("return on empty stack"))?));
                }
                RETURN => return Ok(None),
                other => bail!("unsupported opcode 0x{:02x} at {} in {}", other, pc, class),
            }
        }
    }
}
