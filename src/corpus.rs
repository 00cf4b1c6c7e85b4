//! Policy corpus loader.
//!
//! Walks the corpus directory, selects eligible files by glob, and turns
//! each one into a [`PolicyDocument`]. File order is always sorted by
//! `source_id` so that chunking and fingerprinting are deterministic.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::error::{RagError, Result};
use crate::models::PolicyDocument;

/// An eligible file in the corpus, before its content is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFile {
    pub source_id: String,
    pub path: PathBuf,
}

/// List eligible corpus files sorted by `source_id`.
///
/// Fails with [`RagError::CorpusNotFound`] if the root is missing and
/// [`RagError::EmptyCorpus`] if nothing matches the include globs.
pub fn eligible_files(corpus: &CorpusConfig) -> Result<Vec<CorpusFile>> {
    let root = &corpus.path;
    if !root.is_dir() {
        return Err(RagError::CorpusNotFound(root.clone()));
    }

    let include_set = build_globset(&corpus.include_globs)?;
    let exclude_set = build_globset(&["**/.git/**".to_string(), "**/.*/**".to_string()])?;

    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| RagError::Corpus {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone()),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(CorpusFile {
            source_id: rel_str,
            path: path.to_path_buf(),
        });
    }

    if files.is_empty() {
        return Err(RagError::EmptyCorpus(root.clone()));
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    Ok(files)
}

/// Load every eligible file as a [`PolicyDocument`].
pub fn load_policy_documents(corpus: &CorpusConfig) -> Result<Vec<PolicyDocument>> {
    let files = eligible_files(corpus)?;
    let mut documents = Vec::with_capacity(files.len());

    for file in files {
        let bytes = std::fs::read(&file.path)?;
        let content = String::from_utf8(bytes).map_err(|e| RagError::Corpus {
            path: file.path.clone(),
            message: format!("file is not valid UTF-8: {}", e),
        })?;

        debug!(source_id = %file.source_id, bytes = content.len(), "loaded policy document");

        documents.push(PolicyDocument {
            content,
            display_name: display_name(&file.path),
            source_id: file.source_id,
        });
    }

    Ok(documents)
}

/// Derive a policy title from a file path: `pto-policy.md` → `Pto Policy`.
///
/// Dashes become spaces, then every alphabetic run is capitalized and the
/// rest of the run lower-cased.
pub fn display_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut out = String::with_capacity(stem.len());
    let mut prev_alpha = false;
    for c in stem.replace('-', " ").chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| RagError::Configuration(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::Configuration(format!("invalid glob set: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(Path::new("pto.md")), "Pto");
        assert_eq!(
            display_name(Path::new("remote-work-policy.md")),
            "Remote Work Policy"
        );
        assert_eq!(display_name(Path::new("dir/IT-SECURITY.txt")), "It Security");
        assert_eq!(display_name(Path::new("code_of_conduct.md")), "Code_Of_Conduct");
    }

    #[test]
    fn test_missing_root() {
        let corpus = CorpusConfig::new("/definitely/not/here");
        assert!(matches!(
            eligible_files(&corpus),
            Err(RagError::CorpusNotFound(_))
        ));
    }

    #[test]
    fn test_empty_root() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("image.png"), b"\x89PNG").unwrap();
        let corpus = CorpusConfig::new(tmp.path());
        assert!(matches!(
            eligible_files(&corpus),
            Err(RagError::EmptyCorpus(_))
        ));
    }

    #[test]
    fn test_sorted_and_top_level_only() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.md"), "b").unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        fs::create_dir_all(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested/c.md"), "c").unwrap();

        let files = eligible_files(&CorpusConfig::new(tmp.path())).unwrap();
        let ids: Vec<&str> = files.iter().map(|f| f.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a.txt", "b.md"]);
    }

    #[test]
    fn test_recursive_glob() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("hr")).unwrap();
        fs::write(tmp.path().join("hr/leave.md"), "leave").unwrap();
        fs::create_dir_all(tmp.path().join(".git")).unwrap();
        fs::write(tmp.path().join(".git/notes.md"), "x").unwrap();

        let mut corpus = CorpusConfig::new(tmp.path());
        corpus.include_globs = vec!["**/*.md".to_string()];
        let files = eligible_files(&corpus).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].source_id, "hr/leave.md");
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("bad.md"), [0xff, 0xfe, 0x00]).unwrap();
        let err = load_policy_documents(&CorpusConfig::new(tmp.path())).unwrap_err();
        assert!(matches!(err, RagError::Corpus { .. }));
    }

    #[test]
    fn test_load_documents() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("pto.md"),
            "Employees get 15 vacation days per year.",
        )
        .unwrap();
        let docs = load_policy_documents(&CorpusConfig::new(tmp.path())).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_id, "pto.md");
        assert_eq!(docs[0].display_name, "Pto");
        assert_eq!(docs[0].content, "Employees get 15 vacation days per year.");
    }
}
