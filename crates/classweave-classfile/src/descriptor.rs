//! Field and method descriptors.

use anyhow::{anyhow, bail, Result};

use crate::opcodes;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn parse(descriptor: &str) -> Result<FieldType> {
        let mut pos = 0;
        let ty = Self::parse_at(descriptor, &mut pos)?;
        if pos != descriptor.len() {
            bail!("trailing characters in field descriptor {:?}", descriptor);
        }
        Ok(ty)
    }

    fn parse_at(descriptor: &str, pos: &mut usize) -> Result<FieldType> {
        let bytes = descriptor.as_bytes();
        let tag = *bytes
            .get(*pos)
            .ok_or_else(|| anyhow!("truncated descriptor {:?}", descriptor))?;
        *pos += 1;
        Ok(match tag {
            b'B' => FieldType::Byte,
            b'C' => FieldType::Char,
            b'D' => FieldType::Double,
            b'F' => FieldType::Float,
            b'I' => FieldType::Int,
            b'J' => FieldType::Long,
            b'S' => FieldType::Short,
            b'Z' => FieldType::Boolean,
            b'L' => {
                let rest = &descriptor[*pos..];
                let end = rest
                    .find(';')
                    .ok_or_else(|| anyhow!("unterminated class type in {:?}", descriptor))?;
                if end == 0 {
                    bail!("empty class name in {:?}", descriptor);
                }
                let name = rest[..end].to_string();
                *pos += end + 1;
                FieldType::Object(name)
            }
            b'[' => FieldType::Array(Box::new(Self::parse_at(descriptor, pos)?)),
            other => bail!(
                "invalid descriptor character {:?} in {:?}",
                other as char,
                descriptor
            ),
        })
    }

    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            FieldType::Byte => out.push('B'),
            FieldType::Char => out.push('C'),
            FieldType::Double => out.push('D'),
            FieldType::Float => out.push('F'),
            FieldType::Int => out.push('I'),
            FieldType::Long => out.push('J'),
            FieldType::Short => out.push('S'),
            FieldType::Boolean => out.push('Z'),
            FieldType::Object(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            FieldType::Array(inner) => {
                out.push('[');
                inner.write_descriptor(out);
            }
        }
    }

    /// Local variable / operand stack slots taken by a value of this type.
    pub fn slots(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    /// The class named by this type, looking through array dimensions.
    pub fn element_class(&self) -> Option<&str> {
        match self {
            FieldType::Object(name) => Some(name),
            FieldType::Array(inner) => inner.element_class(),
            _ => None,
        }
    }

    fn kind_offset(&self) -> u8 {
        match self {
            FieldType::Long => 1,
            FieldType::Float => 2,
            FieldType::Double => 3,
            FieldType::Object(_) | FieldType::Array(_) => 4,
            _ => 0,
        }
    }

    /// `xload <n>` opcode family base (`iload` .. `aload`).
    pub fn load_opcode(&self) -> u8 {
        opcodes::ILOAD + self.kind_offset()
    }

    pub fn store_opcode(&self) -> u8 {
        opcodes::ISTORE + self.kind_offset()
    }

    pub fn return_opcode(&self) -> u8 {
        opcodes::IRETURN + self.kind_offset()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    /// `None` for `void`.
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor> {
        if !descriptor.starts_with('(') {
            bail!("method descriptor must start with '(': {:?}", descriptor);
        }
        let mut pos = 1;
        let mut params = Vec::new();
        while descriptor.as_bytes().get(pos) != Some(&b')') {
            if pos >= descriptor.len() {
                bail!("unterminated parameter list in {:?}", descriptor);
            }
            params.push(FieldType::parse_at(descriptor, &mut pos)?);
        }
        pos += 1;
        let ret = if &descriptor[pos..] == "V" {
            None
        } else {
            Some(FieldType::parse(&descriptor[pos..])?)
        };
        Ok(MethodDescriptor { params, ret })
    }

    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for p in &self.params {
            p.write_descriptor(&mut out);
        }
        out.push(')');
        match &self.ret {
            Some(ret) => ret.write_descriptor(&mut out),
            None => out.push('V'),
        }
        out
    }

    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slots).sum()
    }

    pub fn return_slots(&self) -> u16 {
        self.ret.as_ref().map(FieldType::slots).unwrap_or(0)
    }

    pub fn return_opcode(&self) -> u8 {
        self.ret
            .as_ref()
            .map(FieldType::return_opcode)
            .unwrap_or(opcodes::RETURN)
    }
}

/// Rewrites every `L<name>;` class reference in a field or method
/// descriptor through `map`. Base types and array markers are kept.
pub fn map_descriptor_classes<F>(descriptor: &str, mut map: F) -> String
where
    F: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(descriptor.len());
    let mut rest = descriptor;
    while let Some(c) = rest.chars().next() {
        if c == 'L' {
            if let Some(end) = rest.find(';') {
                out.push('L');
                out.push_str(&map(&rest[1..end]));
                out.push(';');
                rest = &rest[end + 1..];
                continue;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Class names mentioned in a descriptor, array element types included.
pub fn descriptor_classes(descriptor: &str) -> Vec<String> {
    let mut found = Vec::new();
    map_descriptor_classes(descriptor, |name| {
        found.push(name.to_string());
        name.to_string()
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_descriptor_parse() {
        let d = MethodDescriptor::parse("(IJ[Ljava/lang/String;)Ljava/lang/Object;").unwrap();
        assert_eq!(d.params.len(), 3);
        assert_eq!(d.param_slots(), 4);
        assert_eq!(d.ret, Some(FieldType::Object("java/lang/Object".into())));
        assert_eq!(d.descriptor(), "(IJ[Ljava/lang/String;)Ljava/lang/Object;");
    }

    #[test]
    fn test_void_return() {
        let d = MethodDescriptor::parse("()V").unwrap();
        assert!(d.params.is_empty());
        assert_eq!(d.ret, None);
        assert_eq!(d.return_opcode(), opcodes::RETURN);
    }

    #[test]
    fn test_invalid_descriptors() {
        assert!(FieldType::parse("Q").is_err());
        assert!(FieldType::parse("La/B").is_err());
        assert!(FieldType::parse("II").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
    }

    #[test]
    fn test_map_descriptor_classes() {
        let mapped = map_descriptor_classes("(La/B;[[La/C;I)La/B;", |n| {
            if n == "a/B" {
                "x/Y".to_string()
            } else {
                n.to_string()
            }
        });
        assert_eq!(mapped, "(Lx/Y;[[La/C;I)Lx/Y;");
    }

    #[test]
    fn test_opcode_families() {
        assert_eq!(FieldType::Int.load_opcode(), opcodes::ILOAD);
        assert_eq!(FieldType::Object("a".into()).load_opcode(), opcodes::ALOAD);
        assert_eq!(FieldType::Double.return_opcode(), opcodes::DRETURN);
        assert_eq!(FieldType::Long.store_opcode(), opcodes::LSTORE);
    }

    #[test]
    fn test_element_class_through_arrays() {
        let t = FieldType::parse("[[Lcom/mod/Data;").unwrap();
        assert_eq!(t.element_class(), Some("com/mod/Data"));
        assert_eq!(descriptor_classes("([La/B;I)Lc/D;"), vec!["a/B", "c/D"]);
    }
}
