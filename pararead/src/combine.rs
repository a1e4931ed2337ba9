//! Combine chunk outputs into the final output.

use crate::chunk_keys::{ChunkKey, ChunkKeySpace};
use crate::errors::ProcessorError;
use crate::merge::MergeStrategies;
use crate::temp_store::TempFileStore;
use anyhow::{Context, Result};
use log::{info, warn};
use std::path::{Path, PathBuf};

/// What a call to [`Combiner::combine`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombineReport {
    /// The chunk outputs merged into the final output, in request order.
    pub merged: Vec<PathBuf>,
    /// Requested keys without an output file, in request order.
    pub missing: Vec<ChunkKey>,
    /// Every warning that was logged.
    pub warnings: Vec<String>,
}

impl CombineReport {
    fn warn(&mut self, msg: String) {
        warn!("{msg}");
        self.warnings.push(msg);
    }
}

/// Merges chunk outputs from a [`TempFileStore`] into one file.
pub struct Combiner<'a> {
    keys: &'a ChunkKeySpace,
    store: &'a TempFileStore,
    strategies: &'a MergeStrategies,
    output: &'a Path,
}

impl<'a> Combiner<'a> {
    /// A combiner writing to `output`.
    pub fn new(
        keys: &'a ChunkKeySpace,
        store: &'a TempFileStore,
        strategies: &'a MergeStrategies,
        output: &'a Path,
    ) -> Self {
        Combiner {
            keys,
            store,
            strategies,
            output,
        }
    }

    /// Merge the outputs of `requested` into the final output.
    ///
    /// Every key must lie inside the limit. With `strict`, any missing output
    /// is an error and the final output is left untouched; otherwise each
    /// missing key is warned about and skipped. Nothing is written when no
    /// output is found. The final output is replaced atomically, so repeating
    /// a call gives the same file.
    pub fn combine(
        &self,
        requested: &[ChunkKey],
        strict: bool,
        separator: Option<&str>,
    ) -> Result<CombineReport> {
        self.keys.limit(requested)?;
        let (found, missing) = self.store.resolve(requested)?;

        let mut report = CombineReport::default();
        if requested.is_empty() {
            report.warn(format!(
                "nothing to combine into {}: no chunks requested",
                self.output.display()
            ));
            return Ok(report);
        }

        if !missing.is_empty() {
            if strict {
                return Err(ProcessorError::MissingOutputFile { keys: missing }.into());
            }
            for key in &missing {
                report.warn(format!(
                    "skipping chunk {key}: no output at {}",
                    self.store.path_for(key).display()
                ));
            }
        }
        report.missing = missing;

        let sources: Vec<PathBuf> = found.into_iter().map(|(_, path)| path).collect();
        if sources.is_empty() {
            return Ok(report);
        }

        self.write_atomically(&sources, separator)?;
        info!(
            "combined {} chunk(s) into {}",
            sources.len(),
            self.output.display()
        );
        report.merged = sources;
        Ok(report)
    }

    // Merge into a temp file next to the output, then move it into place.
    fn write_atomically(&self, sources: &[PathBuf], separator: Option<&str>) -> Result<()> {
        let parent = match self.output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut builder = tempfile::Builder::new();
        builder.prefix(".combine_");
        // Temp files default to 0600; ask for what a plain create would get.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o666));
        }
        let staging = builder
            .tempfile_in(parent)
            .with_context(|| format!("failed to stage output in {}", parent.display()))?;
        self.strategies
            .get(self.store.format())
            .merge(sources, staging.path(), separator)?;
        // a replaced output keeps its mode
        if let Ok(existing) = std::fs::metadata(self.output) {
            staging
                .as_file()
                .set_permissions(existing.permissions())
                .with_context(|| format!("failed to set mode of {}", staging.path().display()))?;
        }
        staging
            .persist(self.output)
            .with_context(|| format!("failed to write {}", self.output.display()))?;
        Ok(())
    }
}
