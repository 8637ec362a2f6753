//! Jar archive access for classweave.
//!
//! Archives are read fully into memory as ordered [`ArchiveEntry`] lists and
//! written back through a temp file that is renamed over the destination only
//! once complete.

pub mod paths;
pub mod reader;
pub mod writer;

pub use reader::{entry_names, read_archive, read_entry, ArchiveEntry};
pub use writer::{stage_archive, write_archive, PendingArchive};

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    fn sample_entries() -> Vec<ArchiveEntry> {
        vec![
            ArchiveEntry::directory("a"),
            ArchiveEntry::file("a/B.class", vec![0xCA, 0xFE, 0xBA, 0xBE]),
            ArchiveEntry::file("fabric.mod.json", b"{}".to_vec()),
        ]
    }

    #[test]
    fn test_write_then_read_preserves_order() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("out.jar");
        write_archive(&path, &sample_entries())?;

        let entries = read_archive(&path)?;
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a/", "a/B.class", "fabric.mod.json"]);
        assert_eq!(entries[1].data, vec![0xCA, 0xFE, 0xBA, 0xBE]);
        assert_eq!(entries[1].class_name(), Some("a/B"));
        Ok(())
    }

    #[test]
    fn test_read_single_entry() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("in.jar");
        write_archive(&path, &sample_entries())?;

        assert_eq!(read_entry(&path, "fabric.mod.json")?, Some(b"{}".to_vec()));
        assert_eq!(read_entry(&path, "missing.txt")?, None);
        assert_eq!(entry_names(&path)?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_unpublished_archive_leaves_destination_untouched() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("keep.jar");
        std::fs::write(&path, b"original")?;

        let pending = stage_archive(&path, &sample_entries())?;
        assert_eq!(std::fs::read(&path)?, b"original");
        drop(pending);
        assert_eq!(std::fs::read(&path)?, b"original");
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn test_identical_inputs_give_identical_archives() -> Result<()> {
        let dir = TempDir::new()?;
        let a = dir.path().join("a.jar");
        let b = dir.path().join("b.jar");
        write_archive(&a, &sample_entries())?;
        write_archive(&b, &sample_entries())?;
        assert_eq!(std::fs::read(&a)?, std::fs::read(&b)?);
        Ok(())
    }

    #[test]
    fn test_missing_archive_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(read_archive(&dir.path().join("nope.jar")).is_err());
    }
}
