//! Strategies for merging chunk outputs into the final output.

use crate::temp_store::IntermediateFormat;
use anyhow::{bail, Context, Result};
use rust_htslib::bam::{self, Read};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes the merge of `sources`, in order, to `dest`.
pub trait MergeStrategy: Send + Sync {
    /// `dest` is a fresh file; `separator`, if any, goes between two sources.
    fn merge(&self, sources: &[PathBuf], dest: &Path, separator: Option<&str>) -> Result<()>;
}

/// Byte concatenation, optionally separator-joined.
#[derive(Debug, Clone, Copy, Default)]
pub struct Concatenate;

impl MergeStrategy for Concatenate {
    fn merge(&self, sources: &[PathBuf], dest: &Path, separator: Option<&str>) -> Result<()> {
        let mut out = BufWriter::new(
            File::create(dest).with_context(|| format!("failed to create {}", dest.display()))?,
        );
        for (i, source) in sources.iter().enumerate() {
            if i > 0 {
                if let Some(sep) = separator {
                    out.write_all(sep.as_bytes())?;
                }
            }
            let mut input = BufReader::new(
                File::open(source).with_context(|| format!("failed to open {}", source.display()))?,
            );
            io::copy(&mut input, &mut out)
                .with_context(|| format!("failed to copy {}", source.display()))?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Record-level BAM merge. The header of the first source is used for the
/// output, and every source must list the same reference sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct BamConcat;

impl MergeStrategy for BamConcat {
    fn merge(&self, sources: &[PathBuf], dest: &Path, _separator: Option<&str>) -> Result<()> {
        let Some(first) = sources.first() else {
            bail!("no BAM chunks to merge into {}", dest.display());
        };
        let template = bam::Reader::from_path(first)
            .with_context(|| format!("failed to open BAM chunk {}", first.display()))?;
        let targets = target_names(template.header());
        let header = bam::Header::from_template(template.header());
        let mut writer = bam::Writer::from_path(dest, &header, bam::Format::Bam)
            .with_context(|| format!("failed to create {}", dest.display()))?;
        drop(template);

        let mut record = bam::Record::new();
        for source in sources {
            let mut input = bam::Reader::from_path(source)
                .with_context(|| format!("failed to open BAM chunk {}", source.display()))?;
            if target_names(input.header()) != targets {
                bail!(
                    "BAM chunk {} has different reference sequences than {}",
                    source.display(),
                    first.display()
                );
            }
            while let Some(r) = input.read(&mut record) {
                r.with_context(|| format!("failed to read BAM chunk {}", source.display()))?;
                writer.write(&record)?;
            }
        }
        Ok(())
    }
}

fn target_names(header: &bam::HeaderView) -> Vec<Vec<u8>> {
    header.target_names().into_iter().map(<[u8]>::to_vec).collect()
}

/// The merge strategy of each intermediate format.
pub struct MergeStrategies {
    by_format: HashMap<IntermediateFormat, Box<dyn MergeStrategy>>,
}

impl Default for MergeStrategies {
    fn default() -> Self {
        let mut strategies = MergeStrategies {
            by_format: HashMap::new(),
        };
        strategies.register(IntermediateFormat::Bam, BamConcat);
        strategies
    }
}

impl MergeStrategies {
    /// Use `strategy` for `format`, replacing the previous one.
    pub fn register(&mut self, format: IntermediateFormat, strategy: impl MergeStrategy + 'static) {
        self.by_format.insert(format, Box::new(strategy));
    }

    /// The strategy for `format`; plain concatenation unless another was registered.
    pub fn get(&self, format: IntermediateFormat) -> &dyn MergeStrategy {
        match self.by_format.get(&format) {
            Some(strategy) => strategy.as_ref(),
            None => &Concatenate,
        }
    }
}
