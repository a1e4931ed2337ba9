//! The reads-file collaborator: what the processor needs from an alignment file.

use crate::errors::ProcessorError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options forwarded to the reader when a reads file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Check the header for reference sequences. When false an unaligned
    /// file is admitted even if the processor requires aligned input.
    pub check_sq: bool,
    /// Fail to open when no index accompanies the file.
    pub require_index: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            check_sq: true,
            require_index: false,
        }
    }
}

/// An open reads file.
pub trait ReadsFile {
    /// The record type handed out by [`ReadsFile::for_each_read`].
    type Record;

    /// Names of the reference sequences, in header order.
    fn reference_names(&self) -> Vec<String>;

    /// Visit every read placed on the reference `name`.
    fn for_each_read(
        &mut self,
        name: &str,
        f: &mut dyn FnMut(&Self::Record) -> Result<()>,
    ) -> Result<()>;

    /// True if the header carries reference sequences.
    fn is_aligned(&self) -> bool {
        !self.reference_names().is_empty()
    }

    /// Number of reads placed on the reference `name`.
    fn count(&mut self, name: &str) -> Result<u64> {
        let mut n = 0;
        self.for_each_read(name, &mut |_| {
            n += 1;
            Ok(())
        })?;
        Ok(n)
    }
}

/// Knows how to open a fresh handle to one reads file.
///
/// Every worker calls [`ReadsFileOpener::open`] for itself; handles are never
/// moved between workers, so only the opener has to be shareable.
pub trait ReadsFileOpener: Sync {
    /// The handle type.
    type Reads: ReadsFile;

    /// Path of the underlying file, used for messages and output naming.
    fn path(&self) -> &Path;

    /// Open a new handle.
    fn open(&self, options: &ReaderOptions) -> Result<Self::Reads>;
}

/// Open a handle and apply the aligned-input gate.
///
/// Unaligned input is rejected unless `allow_unaligned` is set or the reader
/// was asked not to check the header for reference sequences.
pub fn open_validated<O: ReadsFileOpener>(
    opener: &O,
    options: &ReaderOptions,
    allow_unaligned: bool,
) -> Result<O::Reads> {
    let reads = opener.open(options)?;
    if !reads.is_aligned() && !allow_unaligned && options.check_sq {
        return Err(ProcessorError::UnalignedInput {
            path: opener.path().to_path_buf(),
        }
        .into());
    }
    Ok(reads)
}
