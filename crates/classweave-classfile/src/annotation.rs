//! `Runtime(In)Visible(Parameter)Annotations` payloads.

use anyhow::{bail, Result};

use crate::attribute::{names, Attribute};
use crate::bytes::{count_u16, put_u16, put_u8, ByteReader};
use crate::constant_pool::ConstantPool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Utf8 index of the annotation type descriptor.
    pub type_index: u16,
    pub elements: Vec<ElementPair>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementPair {
    pub name_index: u16,
    pub value: ElementValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Tags `B C D F I J S Z s`.
    Const { tag: u8, const_value_index: u16 },
    Enum {
        type_name_index: u16,
        const_name_index: u16,
    },
    /// Utf8 index of a return descriptor.
    Class { class_info_index: u16 },
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

impl Annotation {
    pub fn new(pool: &mut ConstantPool, descriptor: &str) -> Result<Self> {
        Ok(Self {
            type_index: pool.add_utf8(descriptor)?,
            elements: Vec::new(),
        })
    }

    pub fn with_element(mut self, pool: &mut ConstantPool, name: &str, value: ElementValue) -> Result<Self> {
        self.elements.push(ElementPair {
            name_index: pool.add_utf8(name)?,
            value,
        });
        Ok(self)
    }

    fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        let type_index = r.u16()?;
        let count = r.u16()?;
        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_index = r.u16()?;
            let value = ElementValue::parse(r)?;
            elements.push(ElementPair { name_index, value });
        }
        Ok(Self {
            type_index,
            elements,
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        put_u16(out, self.type_index);
        put_u16(out, count_u16(self.elements.len(), "annotation elements")?);
        for pair in &self.elements {
            put_u16(out, pair.name_index);
            pair.value.write(out)?;
        }
        Ok(())
    }
}

impl ElementValue {
    pub fn string(pool: &mut ConstantPool, value: &str) -> Result<Self> {
        Ok(ElementValue::Const {
            tag: b's',
            const_value_index: pool.add_utf8(value)?,
        })
    }

    pub fn class(pool: &mut ConstantPool, descriptor: &str) -> Result<Self> {
        Ok(ElementValue::Class {
            class_info_index: pool.add_utf8(descriptor)?,
        })
    }

    fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        let tag = r.u8()?;
        Ok(match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
                tag,
                const_value_index: r.u16()?,
            },
            b'e' => ElementValue::Enum {
                type_name_index: r.u16()?,
                const_name_index: r.u16()?,
            },
            b'c' => ElementValue::Class {
                class_info_index: r.u16()?,
            },
            b'@' => ElementValue::Annotation(Annotation::parse(r)?),
            b'[' => {
                let count = r.u16()?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(ElementValue::parse(r)?);
                }
                ElementValue::Array(values)
            }
            other => bail!("unknown element value tag {:?}", other as char),
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            ElementValue::Const {
                tag,
                const_value_index,
            } => {
                put_u8(out, *tag);
                put_u16(out, *const_value_index);
            }
            ElementValue::Enum {
                type_name_index,
                const_name_index,
            } => {
                put_u8(out, b'e');
                put_u16(out, *type_name_index);
                put_u16(out, *const_name_index);
            }
            ElementValue::Class { class_info_index } => {
                put_u8(out, b'c');
                put_u16(out, *class_info_index);
            }
            ElementValue::Annotation(a) => {
                put_u8(out, b'@');
                a.write(out)?;
            }
            ElementValue::Array(values) => {
                put_u8(out, b'[');
                put_u16(out, count_u16(values.len(), "array elements")?);
                for v in values {
                    v.write(out)?;
                }
            }
        }
        Ok(())
    }
}

pub fn parse_annotations(info: &[u8]) -> Result<Vec<Annotation>> {
    let mut r = ByteReader::new(info);
    let count = r.u16()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(Annotation::parse(&mut r)?);
    }
    Ok(out)
}

pub fn write_annotations(annotations: &[Annotation]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    put_u16(&mut out, count_u16(annotations.len(), "annotations")?);
    for a in annotations {
        a.write(&mut out)?;
    }
    Ok(out)
}

pub fn parse_parameter_annotations(info: &[u8]) -> Result<Vec<Vec<Annotation>>> {
    let mut r = ByteReader::new(info);
    let params = r.u8()?;
    let mut out = Vec::with_capacity(params as usize);
    for _ in 0..params {
        let count = r.u16()?;
        let mut annotations = Vec::with_capacity(count as usize);
        for _ in 0..count {
            annotations.push(Annotation::parse(&mut r)?);
        }
        out.push(annotations);
    }
    Ok(out)
}

pub fn write_parameter_annotations(params: &[Vec<Annotation>]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    if params.len() > u8::MAX as usize {
        bail!("too many annotated parameters ({})", params.len());
    }
    put_u8(&mut out, params.len() as u8);
    for annotations in params {
        put_u16(&mut out, count_u16(annotations.len(), "annotations")?);
        for a in annotations {
            a.write(&mut out)?;
        }
    }
    Ok(out)
}

/// Builds a `RuntimeInvisibleAnnotations` attribute.
pub fn invisible_annotations(pool: &mut ConstantPool, annotations: &[Annotation]) -> Result<Attribute> {
    let info = write_annotations(annotations)?;
    Attribute::new(pool, names::RUNTIME_INVISIBLE_ANNOTATIONS, info)
}

/// Builds a `RuntimeVisibleAnnotations` attribute.
pub fn visible_annotations(pool: &mut ConstantPool, annotations: &[Annotation]) -> Result<Attribute> {
    let info = write_annotations(annotations)?;
    Attribute::new(pool, names::RUNTIME_VISIBLE_ANNOTATIONS, info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_annotation_payload() {
        let mut pool = ConstantPool::new();
        let target = ElementValue::class(&mut pool, "La/Target;").unwrap();
        let inner = Annotation::new(&mut pool, "La/Inner;").unwrap();
        let outer = Annotation::new(&mut pool, "La/Outer;")
            .unwrap()
            .with_element(&mut pool, "value", ElementValue::Array(vec![target]))
            .unwrap()
            .with_element(&mut pool, "nested", ElementValue::Annotation(inner))
            .unwrap();

        let bytes = write_annotations(std::slice::from_ref(&outer)).unwrap();
        let parsed = parse_annotations(&bytes).unwrap();
        assert_eq!(parsed, vec![outer]);
        assert_eq!(pool.utf8(parsed[0].type_index).unwrap(), "La/Outer;");
    }

    #[test]
    fn test_unknown_tag_rejected() {
        // one annotation, type #1, one pair, name #2, tag 'x'
        let bytes = [0, 1, 0, 1, 0, 1, 0, 2, b'x', 0, 0];
        assert!(parse_annotations(&bytes).is_err());
    }
}
