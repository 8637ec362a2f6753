//! JVM class file support for classweave.
//!
//! - [`class`]: `ClassFile` parse/serialize and access flags
//! - [`constant_pool`]: interning constant pool that preserves original indices
//! - [`visitor`]: `ClassVisitor` chain with `ClassReader` / `ClassWriter`
//! - [`descriptor`] / [`signature`]: type descriptor and generic signature handling
//! - [`attribute`] / [`annotation`]: typed views over the attributes rewriting touches
//! - [`instruction`]: bytecode boundary walker
//! - [`builder`]: class and straight-line code generation

pub mod annotation;
pub mod attribute;
pub mod builder;
pub mod bytes;
pub mod class;
pub mod constant_pool;
pub mod descriptor;
pub mod instruction;
pub mod mutf8;
pub mod opcodes;
pub mod signature;
pub mod visitor;

pub use attribute::{Attribute, CodeAttribute};
pub use builder::{ClassBuilder, CodeBuilder};
pub use class::{access, ClassFile, MemberInfo, JAVA_8};
pub use constant_pool::{Constant, ConstantPool, MemberRef, RefKind};
pub use descriptor::{FieldType, MethodDescriptor};
pub use visitor::{ClassHeader, ClassReader, ClassVisitor, ClassWriter};
