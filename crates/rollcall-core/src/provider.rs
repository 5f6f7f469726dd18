//! Face embedding provider: the seam between the attendance logic and the
//! detection/recognition models.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, ColorOrder, DistanceMetric, Embedding};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("{0}")]
    Other(String),
}

/// Locates faces and turns them into embeddings.
pub trait FaceProvider {
    /// Channel order `locate` and `embed` expect their input in.
    fn color_order(&self) -> ColorOrder;

    /// Metric under which this provider's embeddings are compared.
    fn metric(&self) -> DistanceMetric;

    /// Bounding boxes of all faces in `image`.
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ProviderError>;

    /// One embedding per box in `faces`, in the same order.
    fn embed(&mut self, image: &RgbImage, faces: &[BoundingBox]) -> Result<Vec<Embedding>, ProviderError>;
}

/// Reorder channels of an RGB image for a provider. `Rgb` is a plain copy.
pub fn convert_color_order(image: &RgbImage, order: ColorOrder) -> RgbImage {
    match order {
        ColorOrder::Rgb => image.clone(),
        ColorOrder::Bgr => {
            let mut out = image.clone();
            for pixel in out.pixels_mut() {
                pixel.0.swap(0, 2);
            }
            out
        }
    }
}

/// Detector variant: speed versus recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionModel {
    /// SCRFD-500M at 320x320.
    #[default]
    Fast,
    /// SCRFD-10G at 640x640.
    Accurate,
}

impl DetectionModel {
    pub fn model_file(self) -> &'static str {
        match self {
            DetectionModel::Fast => "det_500m.onnx",
            DetectionModel::Accurate => "det_10g.onnx",
        }
    }

    pub fn input_size(self) -> usize {
        match self {
            DetectionModel::Fast => 320,
            DetectionModel::Accurate => 640,
        }
    }
}

impl FromStr for DetectionModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "hog" => Ok(Self::Fast),
            "accurate" | "cnn" => Ok(Self::Accurate),
            other => Err(format!("unknown detection model {other:?} (expected fast or accurate)")),
        }
    }
}

impl std::fmt::Display for DetectionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => f.write_str("fast"),
            Self::Accurate => f.write_str("accurate"),
        }
    }
}

/// Default model directory: `$XDG_DATA_HOME/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("models")
}

/// SCRFD detection + ArcFace recognition, both through ONNX Runtime.
pub struct OnnxFaceProvider {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceProvider {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path, detection: DetectionModel) -> Result<Self, ProviderError> {
        let det_path = model_dir.join(detection.model_file());
        let rec_path = model_dir.join(RECOGNIZER_MODEL_FILE);

        let detector = FaceDetector::load(&det_path.to_string_lossy(), detection.input_size())?;
        let recognizer = FaceRecognizer::load(&rec_path.to_string_lossy())?;

        tracing::info!(model_dir = %model_dir.display(), %detection, "face provider ready");
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceProvider for OnnxFaceProvider {
    fn color_order(&self) -> ColorOrder {
        ColorOrder::Rgb
    }

    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Cosine
    }

    fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ProviderError> {
        Ok(self.detector.detect(image)?)
    }

    fn embed(&mut self, image: &RgbImage, faces: &[BoundingBox]) -> Result<Vec<Embedding>, ProviderError> {
        faces
            .iter()
            .map(|face| self.recognizer.extract(image, face).map_err(ProviderError::from))
            .collect()
    }
}
