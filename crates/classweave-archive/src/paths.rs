//! Mapping between internal class names and archive entry names.

const CLASS_SUFFIX: &str = ".class";

/// `a/b/C` -> `a/b/C.class`
pub fn class_entry_name(internal_name: &str) -> String {
    format!("{}{}", internal_name, CLASS_SUFFIX)
}

/// `a/b/C.class` -> `a/b/C`. `None` for non-class entries, `module-info`,
/// `package-info` and multi-release copies under `META-INF/`.
pub fn internal_name(entry_name: &str) -> Option<&str> {
    let name = entry_name.strip_suffix(CLASS_SUFFIX)?;
    if entry_name.starts_with("META-INF/")
        || name == "module-info"
        || name.ends_with("/package-info")
        || name == "package-info"
    {
        return None;
    }
    Some(name)
}

pub fn is_class_entry(entry_name: &str) -> bool {
    internal_name(entry_name).is_some()
}

/// File name of an archive path, used in grouping identifiers.
pub fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
