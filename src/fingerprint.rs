//! Corpus fingerprinting and the on-disk fingerprint artifact.
//!
//! The fingerprint is a SHA-256 digest over every eligible corpus file in
//! sorted `source_id` order. Each file contributes its relative path, its
//! byte length and its raw bytes, so edits, renames, additions and removals
//! all change the digest.
//!
//! The artifact (`corpus.fingerprint`, next to the index database) pins the
//! digest to the collection built from it:
//!
//! ```text
//! 3f1c…e9   <- line 1: hex digest
//! policy_documents_v4   <- line 2: active collection id
//! ```
//!
//! It is replaced with write-to-temp + rename, so readers see either the old
//! or the new pair and never a torn file.

use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::CorpusConfig;
use crate::corpus;
use crate::error::{RagError, Result};

pub const FINGERPRINT_FILE: &str = "corpus.fingerprint";

/// Digest of the corpus at the time of a successful index build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintRecord {
    pub fingerprint: String,
    pub collection_id: String,
}

/// Compute the corpus fingerprint as a lowercase hex string.
pub fn compute_fingerprint(corpus: &CorpusConfig) -> Result<String> {
    let files = corpus::eligible_files(corpus)?;
    let mut hasher = Sha256::new();

    for file in &files {
        let bytes = std::fs::read(&file.path)?;
        hasher.update(file.source_id.as_bytes());
        hasher.update([0u8]);
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }

    Ok(hex::encode(hasher.finalize()))
}

pub fn artifact_path(persist_path: &Path) -> PathBuf {
    persist_path.join(FINGERPRINT_FILE)
}

/// Read the artifact. `Ok(None)` if it does not exist; an
/// [`RagError::IndexState`] error if it exists but cannot be parsed.
pub fn read_record(persist_path: &Path) -> Result<Option<FingerprintRecord>> {
    let path = artifact_path(persist_path);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(RagError::IndexState(format!(
                "unreadable fingerprint file {}: {}",
                path.display(),
                e
            )))
        }
    };

    let mut lines = content.lines().map(str::trim);
    let fingerprint = lines.next().unwrap_or_default();
    let collection_id = lines.next().unwrap_or_default();

    let valid_digest = fingerprint.len() == 64 && fingerprint.chars().all(|c| c.is_ascii_hexdigit());
    if !valid_digest || collection_id.is_empty() {
        return Err(RagError::IndexState(format!(
            "malformed fingerprint file {}",
            path.display()
        )));
    }

    Ok(Some(FingerprintRecord {
        fingerprint: fingerprint.to_string(),
        collection_id: collection_id.to_string(),
    }))
}

/// Atomically replace the artifact.
pub fn write_record(persist_path: &Path, record: &FingerprintRecord) -> Result<()> {
    std::fs::create_dir_all(persist_path)?;

    let target = artifact_path(persist_path);
    let tmp = persist_path.join(format!("{}.tmp", FINGERPRINT_FILE));

    {
        let mut file = std::fs::File::create(&tmp)?;
        writeln!(file, "{}", record.fingerprint)?;
        writeln!(file, "{}", record.collection_id)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp, &target)?;
    Ok(())
}

/// Delete the artifact, if any.
pub fn remove_record(persist_path: &Path) -> Result<()> {
    match std::fs::remove_file(artifact_path(persist_path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
