//! Errors raised by the partition / dispatch / combine pipeline.

use std::path::PathBuf;

/// Failures of the processor itself, as opposed to failures of an individual
/// chunk of work (those are logged by the dispatcher and never surface here).
///
/// Public operations return `anyhow::Result`; recover a `ProcessorError` with
/// `err.downcast_ref::<ProcessorError>()`.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ProcessorError {
    /// An operation needed a step that has not been performed yet.
    #[error("{operation} requires {prerequisite} to be called first")]
    CommandOrder {
        /// What was attempted.
        operation: &'static str,
        /// What should have happened before it.
        prerequisite: &'static str,
    },

    /// A chunk key falls outside the configured limit.
    #[error("chunk '{key}' is not among the chunks this processor is limited to")]
    IllegalChunk {
        /// The first offending key.
        key: String,
    },

    /// Strict combination found requested chunks without an output file.
    #[error("missing output for {} chunk(s): {}", keys.len(), keys.join(", "))]
    MissingOutputFile {
        /// Every requested key with no temp file, in request order.
        keys: Vec<String>,
    },

    /// The reads file has no reference sequences and aligned input is required.
    #[error(
        "{} is not aligned (no @SQ header lines); aligned input is required",
        path.display()
    )]
    UnalignedInput {
        /// The offending reads file.
        path: PathBuf,
    },

    /// A chunk key that cannot be used to name a file.
    #[error("invalid chunk key {key:?}: keys must be non-empty and contain no path separator")]
    InvalidChunkKey {
        /// The offending key.
        key: String,
    },

    /// The processor was configured inconsistently.
    #[error("invalid processor configuration: {0}")]
    InvalidConfig(String),
}

impl ProcessorError {
    pub(crate) fn command_order(operation: &'static str, prerequisite: &'static str) -> Self {
        ProcessorError::CommandOrder {
            operation,
            prerequisite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_culprit() {
        let err = ProcessorError::IllegalChunk {
            key: "chr2".to_string(),
        };
        assert!(err.to_string().contains("'chr2'"));

        let err = ProcessorError::MissingOutputFile {
            keys: vec!["chr1".to_string(), "chrX".to_string()],
        };
        assert_eq!(err.to_string(), "missing output for 2 chunk(s): chr1, chrX");

        let err = ProcessorError::command_order("reads()", "register()");
        assert_eq!(err.to_string(), "reads() requires register() to be called first");
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error =
            ProcessorError::InvalidConfig("cores must be positive".into()).into();
        assert_eq!(
            err.downcast_ref::<ProcessorError>(),
            Some(&ProcessorError::InvalidConfig("cores must be positive".into()))
        );
    }
}
