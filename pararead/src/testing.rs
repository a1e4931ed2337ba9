//! In-memory reads fakes shared by the unit tests.

use crate::reads::{ReaderOptions, ReadsFile, ReadsFileOpener};
use anyhow::{anyhow, Result};
use rust_htslib::bam::header::{Header, HeaderRecord};
use rust_htslib::bam::record::{Cigar, CigarString};
use rust_htslib::bam::{self, Record};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A reads file made of (reference name, read count) pairs.
#[derive(Debug, Clone)]
pub(crate) struct MemoryReads {
    references: Vec<(String, u64)>,
}

impl ReadsFile for MemoryReads {
    type Record = u64;

    fn reference_names(&self) -> Vec<String> {
        self.references.iter().map(|(name, _)| name.clone()).collect()
    }

    fn for_each_read(
        &mut self,
        name: &str,
        f: &mut dyn FnMut(&Self::Record) -> Result<()>,
    ) -> Result<()> {
        let (_, n) = self
            .references
            .iter()
            .find(|(r, _)| r == name)
            .ok_or_else(|| anyhow!("unknown reference {name}"))?;
        for i in 0..*n {
            f(&i)?;
        }
        Ok(())
    }
}

/// Opens [`MemoryReads`] and counts how many handles were opened. Clones
/// share the count.
#[derive(Debug, Clone)]
pub(crate) struct MemoryOpener {
    path: PathBuf,
    references: Vec<(String, u64)>,
    pub(crate) opened: Arc<AtomicUsize>,
}

impl MemoryOpener {
    pub(crate) fn new(references: &[(&str, u64)]) -> Self {
        MemoryOpener {
            path: PathBuf::from("/data/sample.bam"),
            references: references
                .iter()
                .map(|(name, n)| (name.to_string(), *n))
                .collect(),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn unaligned() -> Self {
        MemoryOpener::new(&[])
    }

    pub(crate) fn times_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl ReadsFileOpener for MemoryOpener {
    type Reads = MemoryReads;

    fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self, _options: &ReaderOptions) -> Result<MemoryReads> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryReads {
            references: self.references.clone(),
        })
    }
}

const READ_LEN: usize = 20;

/// Write a coordinate-sorted BAM with one reference per entry of `reads` and
/// that many reads on it. With no references the file is unaligned and holds
/// a few unmapped reads instead.
pub(crate) fn write_bam(path: &Path, reads: &[(&str, u64)], index: bool) -> Result<()> {
    let references: Vec<&str> = reads.iter().map(|(name, _)| *name).collect();
    write_bam_with(path, &references, reads, index)
}

/// Like [`write_bam`] but with a header listing `references`, which may be a
/// superset of the references that carry reads.
pub(crate) fn write_bam_with(
    path: &Path,
    references: &[&str],
    reads: &[(&str, u64)],
    index: bool,
) -> Result<()> {
    let mut header = Header::new();
    for name in references {
        let mut sq = HeaderRecord::new(b"SQ");
        sq.push_tag(b"SN", &name);
        sq.push_tag(b"LN", &1_000_000);
        header.push_record(&sq);
    }

    {
        let mut writer = bam::Writer::from_path(path, &header, bam::Format::Bam)?;
        let seq = vec![b'A'; READ_LEN];
        let qual = vec![30u8; READ_LEN];
        if references.is_empty() {
            for i in 0..3 {
                let mut rec = Record::new();
                rec.set(format!("unaligned{i}").as_bytes(), None, &seq, &qual);
                rec.set_tid(-1);
                rec.set_pos(-1);
                rec.set_mtid(-1);
                rec.set_mpos(-1);
                rec.set_unmapped();
                writer.write(&rec)?;
            }
        }
        let cigar = CigarString(vec![Cigar::Match(READ_LEN as u32)]);
        for (name, n) in reads {
            let tid = references
                .iter()
                .position(|r| r == name)
                .ok_or_else(|| anyhow!("{name} is not in the header"))?;
            for pos in 0..*n {
                let mut rec = Record::new();
                rec.set(format!("{name}_{pos}").as_bytes(), Some(&cigar), &seq, &qual);
                rec.set_tid(tid as i32);
                rec.set_pos(pos as i64);
                rec.set_mtid(-1);
                rec.set_mpos(-1);
                rec.set_mapq(60);
                writer.write(&rec)?;
            }
        }
    }

    if index {
        bam::index::build(path, None, bam::index::Type::Bai, 1)?;
    }
    Ok(())
}
