use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::recognition::domain::face_embedding::FaceEmbedding;

/// Human-readable identity name, taken from a corpus folder or file name.
pub type IdentityLabel = String;

#[derive(Error, Debug, PartialEq)]
pub enum IdentitySetError {
    #[error("embedding {index} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("timestamp {0} ms is out of range")]
    InvalidTimestamp(i64),
}

/// One reference embedding and the identity it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct LabeledEmbedding {
    pub embedding: FaceEmbedding,
    pub label: IdentityLabel,
}

impl LabeledEmbedding {
    pub fn new(embedding: FaceEmbedding, label: impl Into<IdentityLabel>) -> Self {
        Self {
            embedding,
            label: label.into(),
        }
    }
}

/// The enrolled "model": an ordered list of labeled reference embeddings.
///
/// Immutable once built. Every embedding shares one dimension, and the
/// cached counts always agree with `entries`. Order is significant: it
/// breaks distance ties during classification.
#[derive(Clone, Debug, PartialEq)]
pub struct KnownIdentitySet {
    entries: Vec<LabeledEmbedding>,
    created_at: DateTime<Utc>,
    unique_label_count: usize,
}

impl KnownIdentitySet {
    /// Build a set stamped with the current time (millisecond precision).
    pub fn new(entries: Vec<LabeledEmbedding>) -> Result<Self, IdentitySetError> {
        let now = Utc::now().timestamp_millis();
        Self::with_created_at_millis(entries, now)
    }

    pub fn with_created_at_millis(
        entries: Vec<LabeledEmbedding>,
        created_at_ms: i64,
    ) -> Result<Self, IdentitySetError> {
        let created_at = DateTime::from_timestamp_millis(created_at_ms)
            .ok_or(IdentitySetError::InvalidTimestamp(created_at_ms))?;
        if let Some(first) = entries.first() {
            let expected = first.embedding.dimension();
            if let Some((index, e)) = entries
                .iter()
                .enumerate()
                .find(|(_, e)| e.embedding.dimension() != expected)
            {
                return Err(IdentitySetError::DimensionMismatch {
                    index,
                    expected,
                    found: e.embedding.dimension(),
                });
            }
        }
        let unique_label_count = entries
            .iter()
            .map(|e| e.label.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        Ok(Self {
            entries,
            created_at,
            unique_label_count,
        })
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            unique_label_count: 0,
        }
    }

    pub fn entries(&self) -> &[LabeledEmbedding] {
        &self.entries
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn embedding_count(&self) -> usize {
        self.entries.len()
    }

    pub fn unique_label_count(&self) -> usize {
        self.unique_label_count
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shared embedding dimension, or `None` for an empty set.
    pub fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.dimension())
    }

    /// Distinct labels with their embedding counts, sorted by label.
    pub fn label_counts(&self) -> Vec<(IdentityLabel, usize)> {
        let mut counts: Vec<(IdentityLabel, usize)> = Vec::new();
        for e in &self.entries {
            match counts.iter_mut().find(|(l, _)| *l == e.label) {
                Some((_, n)) => *n += 1,
                None => counts.push((e.label.clone(), 1)),
            }
        }
        counts.sort_by(|a, b| a.0.cmp(&b.0));
        counts
    }
}
