//! Content-hash based invalidation of processed archives.
//!
//! Every archive written by the processor carries a trailer entry holding
//! the raw SHA-256 of the canonical definition set it was built with. An
//! archive is stale when that entry is missing or differs from the digest of
//! the current definitions.

use std::fmt;
use std::path::Path;

use anyhow::Result;
use sha2::{Digest, Sha256};

use classweave_archive::{read_entry, ArchiveEntry};

use crate::definition::DefinitionSet;

pub const TRAILER_ENTRY: &str = "classweave.sha256";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..]);
        Self(out)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn compute_hash(definitions: &DefinitionSet) -> ContentHash {
    ContentHash::of(definitions.canonical().as_bytes())
}

/// The digest recorded in an archive, if any.
pub fn read_trailer(archive: &Path) -> Result<Option<ContentHash>> {
    Ok(read_entry(archive, TRAILER_ENTRY)?.and_then(|bytes| ContentHash::from_slice(&bytes)))
}

/// True when `archive` is missing, has no trailer, or was built from
/// different definitions.
pub fn is_stale(archive: &Path, digest: &ContentHash) -> Result<bool> {
    if !archive.exists() {
        return Ok(true);
    }
    Ok(read_trailer(archive)?.as_ref() != Some(digest))
}

pub fn trailer_entry(digest: &ContentHash) -> ArchiveEntry {
    ArchiveEntry::file(TRAILER_ENTRY, digest.as_bytes().to_vec())
}

/// Short identifier for the generated-artifact package of one archive:
/// `g` followed by ten hex digits of SHA-256(digest ‖ file name).
pub fn group_id(digest: &ContentHash, artifact_file_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(digest.as_bytes());
    hasher.update(artifact_file_name.as_bytes());
    let full = hex::encode(hasher.finalize());
    format!("g{}", &full[..10])
}
