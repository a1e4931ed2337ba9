//! Construction-time configuration of a processor.

use crate::chunk_keys::{ChunkKey, Limit};
use crate::errors::ProcessorError;
use crate::reads::ReaderOptions;
use crate::temp_store::IntermediateFormat;
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options recognised when building a processor. Every field has a default,
/// so a TOML file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    /// Number of workers; 1 runs every chunk on the calling thread.
    pub cores: usize,
    /// Final output path.
    pub outfile: Option<PathBuf>,
    /// Name of the computation, used to derive the output path when
    /// `outfile` is absent.
    pub action: Option<String>,
    /// Partition by reference sequence rather than by explicit keys.
    pub by_chromosome: bool,
    /// Accept a reads file without reference sequences.
    pub allow_unaligned: bool,
    /// Format of the per-chunk files.
    pub intermediate_format: IntermediateFormat,
    /// Chunk keys that may be processed and combined.
    pub limit: Option<Vec<ChunkKey>>,
    /// Folder for chunk outputs; a fresh folder next to the output when absent.
    pub temp_folder: Option<PathBuf>,
    /// Keep a fresh temp folder after the processor is dropped.
    pub keep_temp: bool,
    /// Options for opening the reads file.
    pub reader: ReaderOptions,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            cores: 1,
            outfile: None,
            action: None,
            by_chromosome: true,
            allow_unaligned: false,
            intermediate_format: IntermediateFormat::Txt,
            limit: None,
            temp_folder: None,
            keep_temp: false,
            reader: ReaderOptions::default(),
        }
    }
}

impl ProcessorConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Read a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
        Self::from_toml_str(&s).with_context(|| path.display().to_string())
    }

    /// Reject inconsistent settings.
    pub fn validate(&self) -> Result<()> {
        if self.cores == 0 {
            return Err(ProcessorError::InvalidConfig("cores must be at least 1".into()).into());
        }
        if self.outfile.is_none() && self.action.is_none() {
            return Err(ProcessorError::InvalidConfig(
                "either an output file or an action name is required".into(),
            )
            .into());
        }
        Ok(())
    }

    /// Whether unaligned input is acceptable. Partitioning by reference needs
    /// reference sequences, so it always requires aligned input.
    pub fn accepts_unaligned(&self) -> bool {
        self.allow_unaligned && !self.by_chromosome
    }

    /// The configured limit, if any.
    pub fn limit(&self) -> Option<Limit> {
        self.limit.as_ref().map(|keys| keys.iter().cloned().collect())
    }

    /// The final output path: `outfile`, or `<dir>/<stem>_<action>.<format>`
    /// next to `reads_path`.
    pub fn output_path(&self, reads_path: &Path) -> Result<PathBuf> {
        if let Some(outfile) = &self.outfile {
            return Ok(outfile.clone());
        }
        let Some(action) = &self.action else {
            return Err(ProcessorError::InvalidConfig(
                "either an output file or an action name is required".into(),
            )
            .into());
        };
        let stem = reads_path
            .file_stem()
            .map_or_else(|| "reads".into(), |s| s.to_string_lossy());
        Ok(reads_path.with_file_name(format!(
            "{stem}_{action}.{}",
            self.intermediate_format.extension()
        )))
    }

    /// Log every setting that differs from its default.
    pub fn log_non_defaults(&self) {
        let default = ProcessorConfig::default();
        macro_rules! report {
            ($($field:ident),*) => {
                $(
                    if self.$field != default.$field {
                        info!("using non-default {} = {:?}", stringify!($field), self.$field);
                    }
                )*
            };
        }
        report!(
            cores,
            outfile,
            action,
            by_chromosome,
            allow_unaligned,
            intermediate_format,
            limit,
            temp_folder,
            keep_temp,
            reader
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_toml_keeps_defaults() -> Result<()> {
        let config = ProcessorConfig::from_toml_str(
            r#"
            cores = 4
            action = "CountReads"
            intermediate_format = "bed"
            limit = ["chr1", "chr2"]

            [reader]
            check_sq = false
            "#,
        )?;
        assert_eq!(
            config,
            ProcessorConfig {
                cores: 4,
                action: Some("CountReads".into()),
                intermediate_format: IntermediateFormat::Bed,
                limit: Some(vec!["chr1".into(), "chr2".into()]),
                reader: ReaderOptions {
                    check_sq: false,
                    require_index: false,
                },
                ..ProcessorConfig::default()
            }
        );
        assert!(config.limit().unwrap().contains("chr2"));
        Ok(())
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(ProcessorConfig::from_toml_str("threads = 2").is_err());
        assert!(ProcessorConfig::from_toml_str("intermediate_format = \"vcf\"").is_err());
    }

    #[test]
    fn test_validate() {
        let err = ProcessorConfig::default().validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProcessorError>(),
            Some(ProcessorError::InvalidConfig(_))
        ));

        let zero = ProcessorConfig {
            cores: 0,
            action: Some("x".into()),
            ..ProcessorConfig::default()
        };
        assert!(zero.validate().is_err());

        let ok = ProcessorConfig {
            outfile: Some("out.txt".into()),
            ..ProcessorConfig::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_output_path() -> Result<()> {
        let reads = Path::new("/data/sample1.bam");
        let derived = ProcessorConfig {
            action: Some("CountReads".into()),
            ..ProcessorConfig::default()
        };
        assert_eq!(
            derived.output_path(reads)?,
            PathBuf::from("/data/sample1_CountReads.txt")
        );

        let explicit = ProcessorConfig {
            outfile: Some("/out/counts.tsv".into()),
            action: Some("CountReads".into()),
            ..ProcessorConfig::default()
        };
        assert_eq!(explicit.output_path(reads)?, PathBuf::from("/out/counts.tsv"));
        assert!(ProcessorConfig::default().output_path(reads).is_err());
        Ok(())
    }

    #[test]
    fn test_unaligned_acceptance() {
        let mut config = ProcessorConfig {
            allow_unaligned: true,
            ..ProcessorConfig::default()
        };
        assert!(!config.accepts_unaligned());
        config.by_chromosome = false;
        assert!(config.accepts_unaligned());
    }
}
