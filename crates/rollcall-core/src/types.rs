use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Scale all coordinates by `factor` (e.g. to map a box found on a
    /// downscaled frame back onto the full-resolution frame).
    pub fn scaled(&self, factor: f32) -> BoundingBox {
        BoundingBox {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(x, y)| (x * factor, y * factor))),
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Distance under `metric`. Lower = more similar.
    pub fn distance(&self, other: &Embedding, metric: DistanceMetric) -> f32 {
        match metric {
            DistanceMetric::Cosine => 1.0 - self.similarity(other),
            DistanceMetric::Euclidean => self.euclidean_distance(other),
        }
    }
}

/// How two embeddings are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`, in [0, 2].
    Cosine,
    Euclidean,
}

/// Channel order an embedding provider expects its input in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorOrder {
    Rgb,
    Bgr,
}

/// A known person: display name paired with the embedding of their reference image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub embedding: Embedding,
}

/// Name shown for faces that match no enrolled identity.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Result of matching a query embedding against the enrolled identities.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Known { name: String, distance: f32 },
    /// No identity was close enough. `distance` is the best distance seen,
    /// `None` when there was nothing to compare against.
    Unknown { distance: Option<f32> },
}

impl MatchOutcome {
    pub fn is_known(&self) -> bool {
        matches!(self, MatchOutcome::Known { .. })
    }

    /// Display label: the identity name, or "Unknown".
    pub fn label(&self) -> &str {
        match self {
            MatchOutcome::Known { name, .. } => name,
            MatchOutcome::Unknown { .. } => UNKNOWN_NAME,
        }
    }

    pub fn distance(&self) -> Option<f32> {
        match self {
            MatchOutcome::Known { distance, .. } => Some(*distance),
            MatchOutcome::Unknown { distance } => *distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_distance_metrics() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert!((a.distance(&b, DistanceMetric::Cosine) - 2.0).abs() < 1e-6);
        assert!((a.distance(&b, DistanceMetric::Euclidean) - 2.0).abs() < 1e-6);
        assert!(a.distance(&a, DistanceMetric::Cosine).abs() < 1e-6);
    }

    #[test]
    fn test_bbox_scaled() {
        let b = BoundingBox {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
            confidence: 0.9,
            landmarks: Some([(1.0, 2.0); 5]),
        };
        let s = b.scaled(4.0);
        assert_eq!((s.x, s.y, s.width, s.height), (40.0, 80.0, 120.0, 160.0));
        assert_eq!(s.landmarks.unwrap()[0], (4.0, 8.0));
        assert_eq!(s.confidence, 0.9);
    }

    #[test]
    fn test_match_outcome_label() {
        let known = MatchOutcome::Known { name: "John Doe".into(), distance: 0.4 };
        assert_eq!(known.label(), "John Doe");
        assert!(known.is_known());
        let unknown = MatchOutcome::Unknown { distance: None };
        assert_eq!(unknown.label(), "Unknown");
        assert_eq!(unknown.distance(), None);
    }
}
