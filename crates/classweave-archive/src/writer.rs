//! Writing archives to a temporary file beside the destination and
//! publishing them with a rename, so readers never see a partial archive.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::reader::ArchiveEntry;

/// A fully written archive waiting to replace its destination.
#[derive(Debug)]
pub struct PendingArchive {
    tmp: NamedTempFile,
    dest: PathBuf,
}

impl PendingArchive {
    pub fn destination(&self) -> &Path {
        &self.dest
    }

    /// Atomically moves the archive into place.
    pub fn publish(self) -> Result<()> {
        let dest = self.dest;
        self.tmp
            .persist(&dest)
            .map_err(|e| anyhow!("Failed to publish {}: {}", dest.display(), e.error))?;
        debug!("Published {}", dest.display());
        Ok(())
    }
}

/// Writes `entries` in order to a temp file in the destination's directory.
/// Entry timestamps are fixed so identical inputs give identical archives.
pub fn stage_archive(dest: &Path, entries: &[ArchiveEntry]) -> Result<PendingArchive> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)
        .map_err(|e| anyhow!("Failed to create directory {}: {}", dir.display(), e))?;
    let mut tmp = NamedTempFile::new_in(&dir)
        .map_err(|e| anyhow!("Failed to create temp file in {}: {}", dir.display(), e))?;

    {
        let mut zip = ZipWriter::new(tmp.as_file_mut());
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());
        for entry in entries {
            if entry.is_dir() {
                zip.add_directory(entry.name.trim_end_matches('/'), options)
                    .with_context(|| format!("Failed to add directory {}", entry.name))?;
            } else {
                zip.start_file(entry.name.as_str(), options)
                    .with_context(|| format!("Failed to add entry {}", entry.name))?;
                zip.write_all(&entry.data)
                    .with_context(|| format!("Failed to write entry {}", entry.name))?;
            }
        }
        zip.finish()
            .with_context(|| format!("Failed to finish archive for {}", dest.display()))?;
    }

    Ok(PendingArchive {
        tmp,
        dest: dest.to_path_buf(),
    })
}

/// Stages and publishes in one step.
pub fn write_archive(dest: &Path, entries: &[ArchiveEntry]) -> Result<()> {
    stage_archive(dest, entries)?.publish()
}
