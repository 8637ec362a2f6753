//! Tiny mapping files (v1 and v2).
//!
//! v1 is a flat list of `CLASS` / `FIELD` / `METHOD` rows; v2 nests members
//! under their class by indentation. Member descriptors are always written in
//! the first namespace. Parameter, local variable and comment rows are
//! skipped.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use classweave_classfile::descriptor::map_descriptor_classes;

use crate::mapping::Mapping;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TinyVersion {
    V1,
    V2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TinyMember {
    /// Descriptor in the first namespace.
    pub descriptor: String,
    /// One entry per namespace; `None` when the column is empty.
    pub names: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TinyClass {
    pub names: Vec<Option<String>>,
    pub fields: Vec<TinyMember>,
    pub methods: Vec<TinyMember>,
}

#[derive(Debug, Clone)]
pub struct TinyFile {
    pub version: TinyVersion,
    pub namespaces: Vec<String>,
    pub classes: Vec<TinyClass>,
}

fn column(names: &[Option<String>], index: usize) -> Option<&str> {
    names.get(index).and_then(|n| n.as_deref())
}

fn unescape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn names_from(parts: &[&str], count: usize, escaped: bool) -> Vec<Option<String>> {
    (0..count)
        .map(|i| {
            parts.get(i).filter(|s| !s.is_empty()).map(|s| {
                if escaped {
                    unescape(s)
                } else {
                    s.to_string()
                }
            })
        })
        .collect()
}

impl TinyFile {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read mappings {}: {}", path.display(), e))?;
        Self::parse(&text).with_context(|| format!("Failed to parse mappings {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().map(|l| l.trim_end_matches('\r'));
        let header = lines.next().ok_or_else(|| anyhow!("empty mapping file"))?;
        let parts: Vec<&str> = header.split('\t').collect();
        match parts.as_slice() {
            ["v1", namespaces @ ..] if namespaces.len() >= 2 => {
                Self::parse_v1(namespaces.iter().map(|s| s.to_string()).collect(), lines)
            }
            ["tiny", "2", _minor, namespaces @ ..] if namespaces.len() >= 2 => {
                Self::parse_v2(namespaces.iter().map(|s| s.to_string()).collect(), lines)
            }
            _ => bail!("unrecognized tiny header {:?}", header),
        }
    }

    fn parse_v1<'a>(namespaces: Vec<String>, lines: impl Iterator<Item = &'a str>) -> Result<Self> {
        let ns = namespaces.len();
        let mut classes: Vec<TinyClass> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();

        fn class_slot(
            classes: &mut Vec<TinyClass>,
            by_name: &mut HashMap<String, usize>,
            owner: &str,
            ns: usize,
        ) -> usize {
            *by_name.entry(owner.to_string()).or_insert_with(|| {
                let mut names = vec![None; ns];
                names[0] = Some(owner.to_string());
                classes.push(TinyClass {
                    names,
                    fields: Vec::new(),
                    methods: Vec::new(),
                });
                classes.len() - 1
            })
        }

        for (line_no, line) in lines.enumerate() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split('\t').collect();
            match parts[0] {
                "CLASS" => {
                    let names = names_from(&parts[1..], ns, false);
                    let first = column(&names, 0)
                        .ok_or_else(|| anyhow!("line {}: CLASS without a name", line_no + 2))?
                        .to_string();
                    let slot = class_slot(&mut classes, &mut by_name, &first, ns);
                    classes[slot].names = names;
                }
                kind @ ("FIELD" | "METHOD") => {
                    if parts.len() < 4 {
                        bail!("line {}: truncated {} row", line_no + 2, kind);
                    }
                    let slot = class_slot(&mut classes, &mut by_name, parts[1], ns);
                    let member = TinyMember {
                        descriptor: parts[2].to_string(),
                        names: names_from(&parts[3..], ns, false),
                    };
                    if kind == "FIELD" {
                        classes[slot].fields.push(member);
                    } else {
                        classes[slot].methods.push(member);
                    }
                }
                other => debug!("Skipping tiny v1 row kind {:?}", other),
            }
        }

        Ok(Self {
            version: TinyVersion::V1,
            namespaces,
            classes,
        })
    }

    fn parse_v2<'a>(namespaces: Vec<String>, lines: impl Iterator<Item = &'a str>) -> Result<Self> {
        let ns = namespaces.len();
        let mut classes: Vec<TinyClass> = Vec::new();
        let mut escaped = false;

        for (line_no, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let indent = line.len() - line.trim_start_matches('\t').len();
            let parts: Vec<&str> = line[indent..].split('\t').collect();
            match (indent, parts[0]) {
                (0, "c") => {
                    let names = names_from(&parts[1..], ns, escaped);
                    if column(&names, 0).is_none() {
                        bail!("line {}: class without a name", line_no + 2);
                    }
                    classes.push(TinyClass {
                        names,
                        fields: Vec::new(),
                        methods: Vec::new(),
                    });
                }
                (1, kind @ ("f" | "m")) => {
                    let class = classes.last_mut().ok_or_else(|| {
                        anyhow!("line {}: member row before any class", line_no + 2)
                    })?;
                    if parts.len() < 3 {
                        bail!("line {}: truncated member row", line_no + 2);
                    }
                    let member = TinyMember {
                        descriptor: parts[1].to_string(),
                        names: names_from(&parts[2..], ns, escaped),
                    };
                    if kind == "f" {
                        class.fields.push(member);
                    } else {
                        class.methods.push(member);
                    }
                }
                (1, property) if classes.is_empty() => {
                    if property == "escaped-names" {
                        escaped = true;
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            version: TinyVersion::V2,
            namespaces,
            classes,
        })
    }

    pub fn namespace_index(&self, namespace: &str) -> Result<usize> {
        self.namespaces
            .iter()
            .position(|n| n == namespace)
            .ok_or_else(|| {
                anyhow!(
                    "namespace {:?} not in mapping file (has {:?})",
                    namespace,
                    self.namespaces
                )
            })
    }

    /// Extracts the `from -> to` mapping. A name missing in `from` falls back
    /// to the first namespace; a name missing in `to` keeps the `from` name.
    pub fn mapping(&self, from: &str, to: &str) -> Result<Mapping> {
        let fi = self.namespace_index(from)?;
        let ti = self.namespace_index(to)?;
        let mut mapping = Mapping::new(from, to);

        let mut first_to_from: HashMap<&str, &str> = HashMap::new();
        for class in &self.classes {
            if let Some(first) = column(&class.names, 0) {
                first_to_from.insert(first, column(&class.names, fi).unwrap_or(first));
            }
        }
        let translate = |desc: &str| -> String {
            if fi == 0 {
                desc.to_string()
            } else {
                map_descriptor_classes(desc, |n| first_to_from.get(n).copied().unwrap_or(n).to_string())
            }
        };

        for class in &self.classes {
            let Some(first) = column(&class.names, 0) else {
                continue;
            };
            let owner = column(&class.names, fi).unwrap_or(first);
            let target = column(&class.names, ti).unwrap_or(owner);
            if owner != target {
                mapping.add_class(owner, target);
            }
            for (members, is_field) in [(&class.fields, true), (&class.methods, false)] {
                for member in members {
                    let Some(first_name) = column(&member.names, 0) else {
                        continue;
                    };
                    let name = column(&member.names, fi).unwrap_or(first_name);
                    let target = column(&member.names, ti).unwrap_or(name);
                    if name == target {
                        continue;
                    }
                    let desc = translate(&member.descriptor);
                    if is_field {
                        mapping.add_field(owner, name, &desc, target);
                    } else {
                        mapping.add_method(owner, name, &desc, target);
                    }
                }
            }
        }

        debug!(
            "Loaded {} -> {} mapping: {} classes, {} fields, {} methods",
            from,
            to,
            mapping.class_count(),
            mapping.field_count(),
            mapping.method_count()
        );
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1: &str = "v1\tofficial\tintermediary\tnamed\n\
CLASS\ta\tnet/minecraft/class_1\tnet/minecraft/Foo\n\
CLASS\tb\tnet/minecraft/class_2\tnet/minecraft/Bar\n\
FIELD\ta\tLb;\tc\tfield_1\tbar\n\
METHOD\ta\t(Lb;)V\td\tmethod_1\ttick\n";

    const V2: &str = "tiny\t2\t0\tintermediary\tnamed\n\
\tescaped-names\n\
c\tnet/minecraft/class_1\tnet/minecraft/Foo\n\
\tc\tA comment on Foo\n\
\tf\tI\tfield_1\tbar\n\
\tm\t(Lnet/minecraft/class_1;)V\tmethod_1\ttick\n\
\t\tp\t1\t\tother\n\
c\tnet/minecraft/class_9\t\n";

    #[test]
    fn test_v1_between_later_namespaces() {
        let file = TinyFile::parse(V1).unwrap();
        assert_eq!(file.version, TinyVersion::V1);
        let m = file.mapping("intermediary", "named").unwrap();
        assert_eq!(m.class_name("net/minecraft/class_1"), Some("net/minecraft/Foo"));
        assert_eq!(
            m.field_name("net/minecraft/class_1", "field_1", "Lnet/minecraft/class_2;"),
            Some("bar")
        );
        assert_eq!(
            m.method_name("net/minecraft/class_1", "method_1", "(Lnet/minecraft/class_2;)V"),
            Some("tick")
        );
    }

    #[test]
    fn test_v1_from_first_namespace() {
        let m = TinyFile::parse(V1).unwrap().mapping("official", "intermediary").unwrap();
        assert_eq!(m.class_name("a"), Some("net/minecraft/class_1"));
        assert_eq!(m.field_name("a", "c", "Lb;"), Some("field_1"));
    }

    #[test]
    fn test_v2_skips_comments_and_params() {
        let file = TinyFile::parse(V2).unwrap();
        assert_eq!(file.version, TinyVersion::V2);
        assert_eq!(file.classes.len(), 2);
        assert_eq!(file.classes[0].fields.len(), 1);
        assert_eq!(file.classes[0].methods.len(), 1);

        let m = file.mapping("intermediary", "named").unwrap();
        assert_eq!(m.field_name("net/minecraft/class_1", "field_1", "I"), Some("bar"));
        // empty target column keeps the source name
        assert_eq!(m.class_name("net/minecraft/class_9"), None);
    }

    #[test]
    fn test_unknown_namespace() {
        let file = TinyFile::parse(V1).unwrap();
        assert!(file.mapping("official", "mojang").is_err());
    }

    #[test]
    fn test_bad_header() {
        assert!(TinyFile::parse("tsrg2 a b\n").is_err());
    }

    #[test]
    fn test_read_from_disk() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("mappings.tiny");
        std::fs::write(&path, V2)?;
        let file = TinyFile::read(&path)?;
        assert_eq!(file.namespaces, vec!["intermediary", "named"]);
        Ok(())
    }
}
