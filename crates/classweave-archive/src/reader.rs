//! Reading jar archives into memory.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::paths;

/// One archive entry. Directory entries have a trailing `/` and no data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    pub fn file(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn directory(name: &str) -> Self {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{}/", name)
        };
        Self {
            name,
            data: Vec::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Internal class name if this is a transformable class entry.
    pub fn class_name(&self) -> Option<&str> {
        paths::internal_name(&self.name)
    }
}

fn open(path: &Path) -> Result<ZipArchive<File>> {
    let file =
        File::open(path).map_err(|e| anyhow!("Failed to open archive {}: {}", path.display(), e))?;
    ZipArchive::new(file).map_err(|e| anyhow!("Failed to read archive {}: {}", path.display(), e))
}

/// Reads every entry, in archive order.
pub fn read_archive(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut archive = open(path)?;
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .with_context(|| format!("Failed to read entry {} of {}", i, path.display()))?;
        let name = file.name().to_string();
        let mut data = Vec::with_capacity(file.size() as usize);
        if !file.is_dir() {
            file.read_to_end(&mut data)
                .with_context(|| format!("Failed to read {} in {}", name, path.display()))?;
        }
        entries.push(ArchiveEntry { name, data });
    }
    Ok(entries)
}

/// Reads a single entry; `None` when the archive has no such entry.
pub fn read_entry(path: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let mut archive = open(path)?;
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(anyhow!("Failed to read {} in {}: {}", name, path.display(), e)),
    };
    let mut data = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut data)
        .with_context(|| format!("Failed to read {} in {}", name, path.display()))?;
    Ok(Some(data))
}

pub fn entry_names(path: &Path) -> Result<Vec<String>> {
    let archive = open(path)?;
    Ok(archive.file_names().map(str::to_string).collect())
}
