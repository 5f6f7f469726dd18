//! Nearest-identity matching of query embeddings.

use crate::types::{DistanceMetric, Embedding, Identity, MatchOutcome};

/// Default match threshold (exclusive).
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.50;

/// Strategy for comparing a query embedding against the enrolled identities.
pub trait Matcher {
    fn best_match(&self, query: &Embedding, identities: &[Identity]) -> MatchOutcome;
}

/// Linear-scan nearest neighbour with a strict distance threshold.
///
/// The closest identity wins if its distance is strictly below `threshold`.
/// Ties go to the lowest index. NaN distances never win.
#[derive(Debug, Clone, Copy)]
pub struct NearestMatcher {
    pub threshold: f32,
    pub metric: DistanceMetric,
}

impl NearestMatcher {
    pub fn new(threshold: f32, metric: DistanceMetric) -> Self {
        Self { threshold, metric }
    }
}

impl Matcher for NearestMatcher {
    fn best_match(&self, query: &Embedding, identities: &[Identity]) -> MatchOutcome {
        let mut best: Option<(usize, f32)> = None;

        for (i, identity) in identities.iter().enumerate() {
            let d = query.distance(&identity.embedding, self.metric);
            let closer = match best {
                None => !d.is_nan(),
                Some((_, best_d)) => d < best_d,
            };
            if closer {
                best = Some((i, d));
            }
        }

        match best {
            Some((idx, distance)) if distance < self.threshold => MatchOutcome::Known {
                name: identities[idx].name.clone(),
                distance,
            },
            Some((_, distance)) => MatchOutcome::Unknown {
                distance: Some(distance),
            },
            None => MatchOutcome::Unknown { distance: None },
        }
    }
}
