//! Process a reads file in parallel, one chunk per reference sequence
//! (or per caller-supplied key), and combine the per-chunk outputs.
//!
//! A [`ParaReadProcessor`] registers a reads file, runs a [`WorkUnit`] on
//! every chunk across worker threads, each writing to its own temp file, and
//! merges the chunk outputs it is asked for into one final output.
#![deny(missing_docs)]

pub mod bam;
pub mod chunk_keys;
pub mod combine;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod merge;
pub mod processor;
pub mod reads;
pub mod temp_store;

#[cfg(test)]
mod testing;

pub use bam::{BamOpener, BamReadsFile};
pub use chunk_keys::{ChunkKey, ChunkKeySpace, Limit};
pub use combine::{CombineReport, Combiner};
pub use config::ProcessorConfig;
pub use dispatch::{ChunkContext, WorkDispatcher, WorkUnit};
pub use errors::ProcessorError;
pub use merge::{BamConcat, Concatenate, MergeStrategies, MergeStrategy};
pub use processor::ParaReadProcessor;
pub use reads::{ReaderOptions, ReadsFile, ReadsFileOpener};
pub use temp_store::{IntermediateFormat, TempFileStore};
