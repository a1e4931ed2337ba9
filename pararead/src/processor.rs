//! The orchestrator: register, run, combine.

use crate::bam::BamOpener;
use crate::chunk_keys::{ChunkKey, ChunkKeySpace, Limit};
use crate::combine::{CombineReport, Combiner};
use crate::config::ProcessorConfig;
use crate::dispatch::{WorkDispatcher, WorkUnit};
use crate::errors::ProcessorError;
use crate::merge::{MergeStrategies, MergeStrategy};
use crate::reads::{open_validated, ReaderOptions, ReadsFileOpener};
use crate::temp_store::{IntermediateFormat, TempFileStore};
use anyhow::Result;
use log::info;
use std::path::{Path, PathBuf};

/// Splits a reads file into chunks, runs a [`WorkUnit`] on each of them and
/// combines the chunk outputs.
///
/// Calls must come in order: [`ParaReadProcessor::register`] before
/// [`ParaReadProcessor::reads`] or [`ParaReadProcessor::run`].
pub struct ParaReadProcessor<O: ReadsFileOpener> {
    config: ProcessorConfig,
    opener: O,
    keys: ChunkKeySpace,
    store: TempFileStore,
    strategies: MergeStrategies,
    output: PathBuf,
    reads: Option<O::Reads>,
}

impl ParaReadProcessor<BamOpener> {
    /// A processor over the BAM file at `path`.
    pub fn for_bam(path: impl Into<PathBuf>, config: ProcessorConfig) -> Result<Self> {
        Self::new(BamOpener::new(path), config)
    }
}

impl<O: ReadsFileOpener> ParaReadProcessor<O> {
    /// Validate `config` and set up the temp folder. Nothing is opened yet.
    pub fn new(opener: O, config: ProcessorConfig) -> Result<Self> {
        config.validate()?;
        config.log_non_defaults();

        let output = config.output_path(opener.path())?;
        let store = match &config.temp_folder {
            Some(folder) => TempFileStore::fixed(folder, config.intermediate_format)?,
            None => {
                let parent = match output.parent() {
                    Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                    _ => PathBuf::from("."),
                };
                let prefix = config.action.clone().unwrap_or_else(|| {
                    output.file_stem().map_or_else(
                        || "pararead".to_string(),
                        |s| s.to_string_lossy().into_owned(),
                    )
                });
                TempFileStore::scoped(
                    &parent,
                    &prefix,
                    config.intermediate_format,
                    config.keep_temp,
                )?
            }
        };
        info!("chunk outputs go to {}", store.folder().display());

        Ok(ParaReadProcessor {
            keys: ChunkKeySpace::new(config.limit()),
            config,
            opener,
            store,
            strategies: MergeStrategies::default(),
            output,
            reads: None,
        })
    }

    /// Open the reads file with the configured reader options.
    pub fn register(&mut self) -> Result<()> {
        let options = self.config.reader;
        self.register_with(options)
    }

    /// Open the reads file with `options`, enforcing the aligned-input
    /// requirement, and keep the handle.
    pub fn register_with(&mut self, options: ReaderOptions) -> Result<()> {
        let reads = open_validated(&self.opener, &options, self.config.accepts_unaligned())?;
        self.config.reader = options;
        self.reads = Some(reads);
        info!("registered {}", self.opener.path().display());
        Ok(())
    }

    /// The registered reads handle.
    pub fn reads(&self) -> Result<&O::Reads> {
        self.reads
            .as_ref()
            .ok_or_else(|| ProcessorError::command_order("reads()", "register()").into())
    }

    /// Run `work` on every chunk and return the keys that produced output.
    ///
    /// Chunks are the reference sequences when partitioning by reference,
    /// otherwise `explicit`. Failed chunks are logged and left out of the
    /// result.
    pub fn run<W: WorkUnit<O::Reads>>(
        &mut self,
        work: &W,
        explicit: Option<&[ChunkKey]>,
    ) -> Result<Vec<ChunkKey>> {
        let Some(reads) = self.reads.as_mut() else {
            return Err(ProcessorError::command_order("run()", "register()").into());
        };
        let keys = self
            .keys
            .resolve(Some(&*reads), self.config.by_chromosome, explicit)?;

        let dispatcher = WorkDispatcher::new(
            &self.opener,
            self.config.reader,
            self.config.accepts_unaligned(),
            &self.store,
            self.config.cores,
        );
        Ok(dispatcher.run(work, keys, Some(reads)))
    }

    /// Merge the outputs of `requested` into the final output.
    /// See [`Combiner::combine`].
    pub fn combine(
        &self,
        requested: &[ChunkKey],
        strict: bool,
        separator: Option<&str>,
    ) -> Result<CombineReport> {
        Combiner::new(&self.keys, &self.store, &self.strategies, &self.output)
            .combine(requested, strict, separator)
    }

    /// Where the output of chunk `key` goes.
    pub fn temp_path(&self, key: &str) -> PathBuf {
        self.store.path_for(key)
    }

    /// The folder holding chunk outputs.
    pub fn temp_folder(&self) -> &Path {
        self.store.folder()
    }

    /// The final output path.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// The configuration this processor was built with.
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Restrict the chunks that may be processed and combined.
    pub fn set_limit(&mut self, limit: Option<Limit>) {
        self.keys.set_limit(limit);
    }

    /// Use `strategy` to merge chunk outputs of `format`.
    pub fn register_merge(
        &mut self,
        format: IntermediateFormat,
        strategy: impl MergeStrategy + 'static,
    ) {
        self.strategies.register(format, strategy);
    }
}
