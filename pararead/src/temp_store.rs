//! Deterministic per-chunk temp file addressing.

use crate::chunk_keys::{check_key, ChunkKey};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strum_macros::{Display, EnumString, IntoStaticStr};
use tempfile::TempDir;

/// Format of the per-chunk intermediate files. The tag doubles as the file
/// extension and selects the merge strategy.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IntermediateFormat {
    /// Plain text.
    #[default]
    Txt,
    /// Tab separated values.
    Tsv,
    /// BED intervals.
    Bed,
    /// BAM alignments.
    Bam,
}

impl IntermediateFormat {
    /// File extension for this format.
    pub fn extension(self) -> &'static str {
        self.into()
    }
}

enum Folder {
    /// Created for this run; removed on drop.
    Scoped(TempDir),
    /// Supplied by the caller, or a scoped folder that was asked to persist.
    Fixed(PathBuf),
}

/// Maps chunk keys to `<folder>/<key>.<format>`.
///
/// Each key owns exactly one path and is written by at most one worker, so no
/// locking is involved.
pub struct TempFileStore {
    folder: Folder,
    format: IntermediateFormat,
}

impl TempFileStore {
    /// A store in a fresh folder under `parent`, named after `prefix`.
    /// The folder is removed when the store is dropped unless `keep` is set.
    pub fn scoped(
        parent: &Path,
        prefix: &str,
        format: IntermediateFormat,
        keep: bool,
    ) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{prefix}_"))
            .tempdir_in(parent)
            .with_context(|| format!("failed to create temp folder in {}", parent.display()))?;
        let folder = if keep {
            Folder::Fixed(dir.into_path())
        } else {
            Folder::Scoped(dir)
        };
        Ok(TempFileStore { folder, format })
    }

    /// A store in a caller-chosen folder, created if needed and never removed.
    pub fn fixed(folder: impl Into<PathBuf>, format: IntermediateFormat) -> Result<Self> {
        let folder = folder.into();
        std::fs::create_dir_all(&folder)
            .with_context(|| format!("failed to create temp folder {}", folder.display()))?;
        Ok(TempFileStore {
            folder: Folder::Fixed(folder),
            format,
        })
    }

    /// The folder holding the chunk outputs.
    pub fn folder(&self) -> &Path {
        match &self.folder {
            Folder::Scoped(dir) => dir.path(),
            Folder::Fixed(path) => path,
        }
    }

    /// The intermediate format fixed at construction.
    pub fn format(&self) -> IntermediateFormat {
        self.format
    }

    /// Where the output of chunk `key` lives.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.folder()
            .join(format!("{key}.{}", self.format.extension()))
    }

    /// Like [`TempFileStore::path_for`], rejecting keys that would escape the folder.
    pub fn checked_path_for(&self, key: &str) -> Result<PathBuf> {
        check_key(key)?;
        Ok(self.path_for(key))
    }

    /// Split `keys` into those whose output exists (with its path) and those
    /// without, both in the given order.
    pub fn resolve(
        &self,
        keys: &[ChunkKey],
    ) -> Result<(Vec<(ChunkKey, PathBuf)>, Vec<ChunkKey>)> {
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for key in keys {
            let path = self.checked_path_for(key)?;
            if path.is_file() {
                found.push((key.clone(), path));
            } else {
                missing.push(key.clone());
            }
        }
        Ok((found, missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProcessorError;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    #[test]
    fn test_format_tags() {
        assert_eq!(IntermediateFormat::default(), IntermediateFormat::Txt);
        assert_eq!(IntermediateFormat::from_str("bed").unwrap(), IntermediateFormat::Bed);
        assert_eq!(IntermediateFormat::Tsv.to_string(), "tsv");
        assert_eq!(IntermediateFormat::Bam.extension(), "bam");
        assert!(IntermediateFormat::from_str("vcf").is_err());
    }

    #[test]
    fn test_path_for_is_deterministic() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = TempFileStore::fixed(dir.path(), IntermediateFormat::Bed)?;
        assert_eq!(store.path_for("chr1"), dir.path().join("chr1.bed"));
        assert_eq!(store.path_for("chr1"), store.path_for("chr1"));
        assert_ne!(store.path_for("chr1"), store.path_for("chr2"));
        Ok(())
    }

    #[test]
    fn test_checked_path_rejects_separators() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = TempFileStore::fixed(dir.path(), IntermediateFormat::Txt)?;
        let err = store.checked_path_for("../chr1").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ProcessorError>(),
            Some(&ProcessorError::InvalidChunkKey {
                key: "../chr1".to_string()
            })
        );
        Ok(())
    }

    #[test]
    fn test_scoped_folder_lifetime() -> Result<()> {
        let parent = tempfile::tempdir()?;

        let store = TempFileStore::scoped(parent.path(), "count", IntermediateFormat::Txt, false)?;
        let folder = store.folder().to_path_buf();
        assert!(folder.is_dir());
        assert!(folder.file_name().unwrap().to_string_lossy().starts_with("count_"));
        drop(store);
        assert!(!folder.exists());

        let kept = TempFileStore::scoped(parent.path(), "count", IntermediateFormat::Txt, true)?;
        let folder = kept.folder().to_path_buf();
        drop(kept);
        assert!(folder.is_dir());
        Ok(())
    }

    #[test]
    fn test_resolve_preserves_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = TempFileStore::fixed(dir.path(), IntermediateFormat::Txt)?;
        std::fs::write(store.path_for("chr2"), "x")?;
        std::fs::write(store.path_for("chr1"), "y")?;

        let keys: Vec<ChunkKey> = ["chr2", "chr3", "chr1", "chr4"].map(String::from).to_vec();
        let (found, missing) = store.resolve(&keys)?;
        let found: Vec<&str> = found.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(found, vec!["chr2", "chr1"]);
        assert_eq!(missing, vec!["chr3", "chr4"]);
        Ok(())
    }
}
