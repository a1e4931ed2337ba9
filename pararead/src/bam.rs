//! BAM reads files through rust-htslib.

use crate::reads::{ReaderOptions, ReadsFile, ReadsFileOpener};
use anyhow::{anyhow, Context, Result};
use log::debug;
use rust_htslib::bam::{self, FetchDefinition, HeaderView, Read, Record};
use std::path::{Path, PathBuf};

/// Opens [`BamReadsFile`] handles on one BAM path.
#[derive(Debug, Clone)]
pub struct BamOpener {
    path: PathBuf,
}

impl BamOpener {
    /// An opener for the BAM at `path`. Nothing is opened until [`ReadsFileOpener::open`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        BamOpener { path: path.into() }
    }
}

impl ReadsFileOpener for BamOpener {
    type Reads = BamReadsFile;

    fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self, options: &ReaderOptions) -> Result<BamReadsFile> {
        BamReadsFile::open(&self.path, options)
    }
}

/// An open BAM file. Per-reference access goes through the index when there
/// is one, otherwise through a full scan filtered on the target id.
pub struct BamReadsFile {
    path: PathBuf,
    header: HeaderView,
    indexed: Option<bam::IndexedReader>,
}

impl BamReadsFile {
    /// Open `path`, using its index if present.
    pub fn open(path: &Path, options: &ReaderOptions) -> Result<Self> {
        let indexed = match bam::IndexedReader::from_path(path) {
            Ok(reader) => Some(reader),
            Err(e) if options.require_index => {
                return Err(e)
                    .with_context(|| format!("failed to open indexed BAM {}", path.display()));
            }
            Err(e) => {
                debug!("no usable index for {}, falling back to scans: {e}", path.display());
                None
            }
        };
        let header = match &indexed {
            Some(reader) => reader.header().clone(),
            None => bam::Reader::from_path(path)
                .with_context(|| format!("failed to open BAM {}", path.display()))?
                .header()
                .clone(),
        };
        Ok(BamReadsFile {
            path: path.to_path_buf(),
            header,
            indexed,
        })
    }

    /// The header of the underlying file.
    pub fn header(&self) -> &HeaderView {
        &self.header
    }

    /// True when per-reference access uses the index.
    pub fn is_indexed(&self) -> bool {
        self.indexed.is_some()
    }

    fn tid(&self, name: &str) -> Result<u32> {
        self.header
            .tid(name.as_bytes())
            .ok_or_else(|| anyhow!("reference {name} not found in {}", self.path.display()))
    }
}

impl ReadsFile for BamReadsFile {
    type Record = Record;

    fn reference_names(&self) -> Vec<String> {
        self.header
            .target_names()
            .into_iter()
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect()
    }

    fn for_each_read(
        &mut self,
        name: &str,
        f: &mut dyn FnMut(&Record) -> Result<()>,
    ) -> Result<()> {
        let tid = self.tid(name)?;
        match self.indexed.as_mut() {
            Some(reader) => {
                reader
                    .fetch(FetchDefinition::CompleteTid(tid as i32))
                    .with_context(|| format!("failed to fetch {name}"))?;
                for record in reader.records() {
                    f(&record?)?;
                }
            }
            None => {
                let mut reader = bam::Reader::from_path(&self.path)?;
                let mut record = Record::new();
                while let Some(r) = reader.read(&mut record) {
                    r?;
                    if record.tid() == tid as i32 {
                        f(&record)?;
                    }
                }
            }
        }
        Ok(())
    }
}
