use std::fmt;

use crate::recognition::domain::face_embedding::FaceEmbedding;
use crate::recognition::domain::known_identity_set::{IdentityLabel, KnownIdentitySet};
use crate::shared::constants::{
    DEFAULT_REJECTION_CEILING, DEFAULT_TOLERANCE, EMPTY_SET_DISTANCE, UNKNOWN_LABEL,
};
use crate::shared::settings::Settings;

/// Outcome label of a classification.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Identity {
    Known(IdentityLabel),
    Unknown,
}

impl Identity {
    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }

    pub fn label(&self) -> &str {
        match self {
            Identity::Known(label) => label,
            Identity::Unknown => UNKNOWN_LABEL,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub identity: Identity,
    /// Distance to the nearest entry, or the empty-set sentinel.
    pub distance: f64,
}

/// Nearest-neighbour classification against `known`.
///
/// Ties keep the first entry in set order. An empty set yields
/// `Unknown` at the sentinel distance.
pub fn classify(embedding: &FaceEmbedding, known: &KnownIdentitySet, tolerance: f64) -> Classification {
    let nearest = known
        .entries()
        .iter()
        .map(|e| (e, embedding.distance(&e.embedding)))
        .fold(None, |best: Option<(_, f64)>, (e, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((e, d)),
        });

    match nearest {
        None => Classification {
            identity: Identity::Unknown,
            distance: EMPTY_SET_DISTANCE,
        },
        Some((e, distance)) if distance <= tolerance => Classification {
            identity: Identity::Known(e.label.clone()),
            distance,
        },
        Some((_, distance)) => Classification {
            identity: Identity::Unknown,
            distance,
        },
    }
}

/// Classification plus the realtime rejection guard.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IdentityMatcher {
    tolerance: f64,
    rejection_ceiling: f64,
}

impl Default for IdentityMatcher {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            rejection_ceiling: DEFAULT_REJECTION_CEILING,
        }
    }
}

impl From<&Settings> for IdentityMatcher {
    fn from(s: &Settings) -> Self {
        Self::new(s.tolerance, s.rejection_ceiling)
    }
}

impl IdentityMatcher {
    pub fn new(tolerance: f64, rejection_ceiling: f64) -> Self {
        Self {
            tolerance,
            rejection_ceiling,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn rejection_ceiling(&self) -> f64 {
        self.rejection_ceiling
    }

    pub fn classify(&self, embedding: &FaceEmbedding, known: &KnownIdentitySet) -> Classification {
        classify(embedding, known, self.tolerance)
    }

    /// Like [`classify`](Self::classify), but returns `None` when the nearest
    /// distance exceeds the rejection ceiling: such a candidate is most
    /// likely not a face at all. The guard is skipped for an empty set so
    /// its sentinel result still surfaces as `Unknown`.
    pub fn decide(&self, embedding: &FaceEmbedding, known: &KnownIdentitySet) -> Option<Classification> {
        let result = self.classify(embedding, known);
        if !known.is_empty() && result.distance > self.rejection_ceiling {
            return None;
        }
        Some(result)
    }
}
