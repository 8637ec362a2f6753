//! Fixture builders: classes, archives, definitions and mapping files.

use std::path::{Path, PathBuf};

use classweave_archive::{write_archive, ArchiveEntry};
use classweave_classfile::access::*;
use classweave_classfile::opcodes::*;
use classweave_classfile::{ClassBuilder, CodeBuilder};

pub const FOO: &str = "a/Foo";

/// `{ "classes": [ Foo { bar:I, static baz:Ljava/lang/String; } ] }`
pub const FOO_DEFINITIONS: &str = r#"{
    "classes": [
        {
            "name": "a/Foo",
            "members": [
                { "name": "bar", "descriptor": "I" },
                { "name": "baz", "descriptor": "Ljava/lang/String;", "static": true }
            ]
        }
    ]
}"#;

pub const MIXED_ROLE_DEFINITIONS: &str = r#"{
    "classes": [
        {
            "name": "a/Foo",
            "interfaces": ["x/Shared"],
            "members": [ { "name": "shared", "descriptor": "Lx/Shared;" } ]
        }
    ]
}"#;

pub const STUB_DEFINITIONS: &str = r#"{
    "classes": [
        {
            "name": "a/Foo",
            "members": [ { "name": "owner", "descriptor": "Lx/Missing;" } ]
        }
    ]
}"#;

pub const METADATA: &str = r#"{ "schemaVersion": 1, "id": "example" }"#;

/// Public class with a no-arg constructor and the given instance fields.
pub fn plain_class(name: &str, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut b = ClassBuilder::new(name, Some("java/lang/Object"), ACC_PUBLIC | ACC_SUPER).unwrap();
    for (field, descriptor) in fields {
        b.add_field(ACC_PRIVATE, field, descriptor).unwrap();
    }
    let init = b.pool_mut().add_method_ref("java/lang/Object", "<init>", "()V").unwrap();
    let mut code = CodeBuilder::new(1, 1);
    code.aload(0).invoke(INVOKESPECIAL, init).op(RETURN);
    b.add_method(ACC_PUBLIC, "<init>", "()V", Some(code.finish())).unwrap();
    b.build().to_bytes().unwrap()
}

/// Class compiled against Foo's synthetic members:
/// `static int read(Foo)`, `static void write(Foo, int)`, `static String readBaz()`.
pub fn client_class(name: &str) -> Vec<u8> {
    let mut b = ClassBuilder::new(name, Some("java/lang/Object"), ACC_PUBLIC | ACC_SUPER).unwrap();
    let bar = b.pool_mut().add_field_ref(FOO, "bar", "I").unwrap();
    let baz = b.pool_mut().add_field_ref(FOO, "baz", "Ljava/lang/String;").unwrap();

    let mut read = CodeBuilder::new(1, 1);
    read.aload(0).field(GETFIELD, bar).op(IRETURN);
    b.add_method(ACC_PUBLIC | ACC_STATIC, "read", "(La/Foo;)I", Some(read.finish()))
        .unwrap();

    let mut write = CodeBuilder::new(2, 2);
    write.aload(0).op(ILOAD_0 + 1).field(PUTFIELD, bar).op(RETURN);
    b.add_method(ACC_PUBLIC | ACC_STATIC, "write", "(La/Foo;I)V", Some(write.finish()))
        .unwrap();

    let mut read_baz = CodeBuilder::new(1, 0);
    read_baz.field(GETSTATIC, baz).op(ARETURN);
    b.add_method(ACC_PUBLIC | ACC_STATIC, "readBaz", "()Ljava/lang/String;", Some(read_baz.finish()))
        .unwrap();

    b.build().to_bytes().unwrap()
}

pub fn write_jar(path: &Path, classes: &[Vec<u8>], extra: &[(&str, &[u8])]) -> PathBuf {
    let mut entries = Vec::new();
    for bytes in classes {
        let name = classweave_classfile::class::peek_class_name(bytes).unwrap();
        entries.push(ArchiveEntry::file(format!("{}.class", name), bytes.clone()));
    }
    for (name, data) in extra {
        entries.push(ArchiveEntry::file(*name, data.to_vec()));
    }
    write_archive(path, &entries).unwrap();
    path.to_path_buf()
}

pub fn write_text(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

/// Tiny v2 mapping renaming `from -> to` for classes only.
pub fn tiny_classes(from_ns: &str, to_ns: &str, classes: &[(&str, &str)]) -> String {
    let mut out = format!("tiny\t2\t0\t{}\t{}\n", from_ns, to_ns);
    for (from, to) in classes {
        out.push_str(&format!("c\t{}\t{}\n", from, to));
    }
    out
}
