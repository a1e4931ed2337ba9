//! Chunk keys and the optional limit on which of them may be used.

use crate::errors::ProcessorError;
use crate::reads::ReadsFile;
use anyhow::Result;
use itertools::Itertools;
use log::{debug, warn};
use std::collections::HashSet;

/// Name of one partition of the work, usually a reference sequence name.
pub type ChunkKey = String;

/// Reject keys that cannot be used as a file name.
pub fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
        return Err(ProcessorError::InvalidChunkKey {
            key: key.to_string(),
        }
        .into());
    }
    Ok(())
}

/// An allow-list of chunk keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Limit {
    keys: HashSet<ChunkKey>,
}

impl Limit {
    /// True if `key` is allowed.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Number of allowed keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if nothing is allowed.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<S: Into<ChunkKey>> FromIterator<S> for Limit {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Limit {
            keys: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Derives the keys of a run and enforces the limit, if any.
#[derive(Debug, Clone, Default)]
pub struct ChunkKeySpace {
    limit: Option<Limit>,
}

impl ChunkKeySpace {
    /// A key space restricted to `limit`, or unrestricted when `None`.
    pub fn new(limit: Option<Limit>) -> Self {
        ChunkKeySpace { limit }
    }

    /// The configured limit.
    pub fn limit_keys(&self) -> Option<&Limit> {
        self.limit.as_ref()
    }

    /// Replace the limit.
    pub fn set_limit(&mut self, limit: Option<Limit>) {
        self.limit = limit;
    }

    /// The ordered, unique keys of a run.
    ///
    /// With `by_chromosome` the keys are the reference names of `reads`, which
    /// must have been registered; names outside the limit, and names that
    /// cannot be used as a file name, are skipped. Otherwise `explicit` must
    /// be supplied; duplicates are dropped and every key must lie inside the
    /// limit and be usable as a file name.
    pub fn resolve<R: ReadsFile>(
        &self,
        reads: Option<&R>,
        by_chromosome: bool,
        explicit: Option<&[ChunkKey]>,
    ) -> Result<Vec<ChunkKey>> {
        if by_chromosome {
            let reads = reads.ok_or_else(|| {
                ProcessorError::command_order("partitioning by reference", "register()")
            })?;
            if explicit.is_some() {
                warn!("ignoring explicit chunk keys: partitioning by reference");
            }
            let (usable, unusable): (Vec<_>, Vec<_>) = reads
                .reference_names()
                .into_iter()
                .partition(|name| check_key(name).is_ok());
            for name in &unusable {
                warn!("skipping reference {name:?}: it cannot name a chunk file");
            }
            return Ok(self.retain_allowed(usable));
        }

        let explicit = explicit.ok_or_else(|| {
            ProcessorError::InvalidConfig(
                "explicit chunk keys are required when not partitioning by reference".into(),
            )
        })?;
        let keys = self.limit(&unique(explicit))?;
        for key in &keys {
            check_key(key)?;
        }
        Ok(keys)
    }

    /// Return `keys` unchanged if every one lies inside the limit, otherwise
    /// fail naming the first that does not.
    pub fn limit(&self, keys: &[ChunkKey]) -> Result<Vec<ChunkKey>> {
        if let Some(limit) = &self.limit {
            if let Some(bad) = keys.iter().find(|k| !limit.contains(k)) {
                return Err(ProcessorError::IllegalChunk { key: bad.clone() }.into());
            }
        }
        Ok(keys.to_vec())
    }

    /// Drop the keys outside the limit, preserving order.
    pub fn retain_allowed(&self, keys: Vec<ChunkKey>) -> Vec<ChunkKey> {
        match &self.limit {
            None => keys,
            Some(limit) => {
                let (kept, skipped): (Vec<_>, Vec<_>) =
                    keys.into_iter().partition(|k| limit.contains(k));
                if !skipped.is_empty() {
                    debug!("limit skips {} chunk(s): {}", skipped.len(), skipped.join(", "));
                }
                kept
            }
        }
    }
}

fn unique(keys: &[ChunkKey]) -> Vec<ChunkKey> {
    for key in keys.iter().duplicates() {
        warn!("dropping duplicate chunk key {key}");
    }
    keys.iter().unique().cloned().collect()
}
